// polystore-core/src/remote/document_db.rs
//! Document-database adapter (MongoDB wire semantics).
//!
//! Every predicate and update construct has a native counterpart, so the
//! whole tree is pushed down: composites become `$and`/`$or`, membership
//! becomes `$elemMatch`, array mutations become `$push`/`$pull`/positional
//! `$set`. Atomicity is whatever the server guarantees for single-document
//! writes. Duplicate-key rejections (server code 11000) surface as
//! `DuplicateKey`; anything else the driver reports becomes
//! `BackendUnavailable`.

use bson::{doc, Bson, Document as BsonDocument};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOptions as DriverFindOptions, IndexOptions};
use mongodb::sync::{Client, Collection, Database};
use mongodb::IndexModel;
use serde_json::Value;

use crate::backend::{Backend, DeleteResult, InsertResult, MutateResult};
use crate::document::Document;
use crate::error::{Result, StoreError};
use crate::find_options::{FindOptions, SortOrder};
use crate::query::{Comparison, FieldPredicate, Predicate};
use crate::update::{ElementMatch, UpdateOp, UpdateSpec};

/// Backend bound to one database of a MongoDB-compatible server.
pub struct DocumentDbBackend {
    db: Database,
}

impl DocumentDbBackend {
    /// Connect and bind to a database. The sync driver validates the URI
    /// eagerly; an unreachable server is reported on first operation.
    pub fn connect(uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).map_err(map_driver_error)?;
        Ok(DocumentDbBackend {
            db: client.database(database),
        })
    }

    fn collection(&self, name: &str) -> Collection<BsonDocument> {
        self.db.collection::<BsonDocument>(name)
    }
}

impl Backend for DocumentDbBackend {
    fn find_one(&self, collection: &str, predicate: &Predicate) -> Result<Option<Document>> {
        let filter = predicate_to_filter(predicate)?;
        self.collection(collection)
            .find_one(filter, None)
            .map_err(map_driver_error)?
            .map(row_to_document)
            .transpose()
    }

    fn find(
        &self,
        collection: &str,
        predicate: &Predicate,
        options: &FindOptions,
    ) -> Result<Vec<Document>> {
        let filter = predicate_to_filter(predicate)?;

        let mut driver_options = DriverFindOptions::default();
        if let Some((field, order)) = &options.sort {
            let direction: i32 = match order {
                SortOrder::Ascending => 1,
                SortOrder::Descending => -1,
            };
            let mut sort = BsonDocument::new();
            sort.insert(field.clone(), direction);
            driver_options.sort = Some(sort);
        }
        driver_options.skip = options.skip.map(|s| s as u64);
        driver_options.limit = options.limit.map(|l| l as i64);

        let cursor = self
            .collection(collection)
            .find(filter, driver_options)
            .map_err(map_driver_error)?;

        let mut results = Vec::new();
        for row in cursor {
            results.push(row_to_document(row.map_err(map_driver_error)?)?);
        }
        Ok(results)
    }

    fn insert_one(&self, collection: &str, document: Document) -> Result<InsertResult> {
        let inserted_id = document.id().cloned().unwrap_or(Value::Null);
        let row = document_to_row(&document)?;
        self.collection(collection)
            .insert_one(row, None)
            .map_err(map_driver_error)?;
        Ok(InsertResult { inserted_id })
    }

    fn update_one(
        &self,
        collection: &str,
        predicate: &Predicate,
        update: &UpdateSpec,
    ) -> Result<MutateResult> {
        if update.is_empty() {
            // Nothing to push down; report match status without writing.
            let matched = self.find_one(collection, predicate)?.is_some();
            return Ok(MutateResult {
                matched_count: u64::from(matched),
                modified_count: 0,
            });
        }

        let (update_doc, extra_filter) = update_to_wire(update)?;
        let base_filter = predicate_to_filter(predicate)?;
        let filter = if extra_filter.is_empty() {
            base_filter
        } else {
            doc! { "$and": [base_filter, extra_filter] }
        };

        let outcome = self
            .collection(collection)
            .update_one(filter, update_doc, None)
            .map_err(map_driver_error)?;
        Ok(MutateResult {
            matched_count: outcome.matched_count,
            modified_count: outcome.modified_count,
        })
    }

    fn delete_one(&self, collection: &str, predicate: &Predicate) -> Result<DeleteResult> {
        let filter = predicate_to_filter(predicate)?;
        let outcome = self
            .collection(collection)
            .delete_one(filter, None)
            .map_err(map_driver_error)?;
        Ok(DeleteResult {
            deleted_count: outcome.deleted_count,
        })
    }

    fn count_documents(&self, collection: &str, predicate: &Predicate) -> Result<u64> {
        let filter = predicate_to_filter(predicate)?;
        self.collection(collection)
            .count_documents(filter, None)
            .map_err(map_driver_error)
    }

    fn create_index(&self, collection: &str, field: &str, unique: bool) -> Result<()> {
        let mut keys = BsonDocument::new();
        keys.insert(field.to_string(), 1_i32);
        let model = IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(unique).build())
            .build();
        self.collection(collection)
            .create_index(model, None)
            .map_err(map_driver_error)?;
        Ok(())
    }
}

/// Translate a predicate tree into a native filter document.
pub(crate) fn predicate_to_filter(predicate: &Predicate) -> Result<BsonDocument> {
    match predicate {
        Predicate::And(children) => {
            if children.is_empty() {
                return Ok(BsonDocument::new());
            }
            if children.len() == 1 {
                return predicate_to_filter(&children[0]);
            }
            // $and sidesteps key collisions when two branches constrain the
            // same field.
            let parts = children
                .iter()
                .map(predicate_to_filter)
                .collect::<Result<Vec<_>>>()?;
            Ok(doc! { "$and": parts })
        }
        Predicate::Or(children) => {
            if children.is_empty() {
                // The server rejects an empty $or; an empty disjunction
                // matches nothing, and nothing fails to match {}.
                let match_all = BsonDocument::new();
                return Ok(doc! { "$nor": [match_all] });
            }
            let parts = children
                .iter()
                .map(predicate_to_filter)
                .collect::<Result<Vec<_>>>()?;
            Ok(doc! { "$or": parts })
        }
        Predicate::Field(fp) => field_filter(fp),
    }
}

fn field_filter(fp: &FieldPredicate) -> Result<BsonDocument> {
    let operand = to_bson(&fp.operand)?;
    let mut filter = BsonDocument::new();
    let condition: Bson = match fp.op {
        Comparison::Eq => operand,
        Comparison::Ne => doc! { "$ne": operand }.into(),
        Comparison::Gt => doc! { "$gt": operand }.into(),
        Comparison::Gte => doc! { "$gte": operand }.into(),
        Comparison::RegexCi => {
            let pattern = fp.operand.as_str().ok_or_else(|| {
                StoreError::InvalidPredicate(format!(
                    "regex predicate on '{}' requires a string pattern",
                    fp.field
                ))
            })?;
            doc! { "$regex": pattern, "$options": "i" }.into()
        }
        // $elemMatch pins matching to array fields, mirroring the
        // evaluator's "absent or non-array never matches" rule. Dotted
        // paths rely on the server's own fan-out instead, where $elemMatch
        // does not apply.
        Comparison::InSet => {
            if fp.field.contains('.') {
                operand
            } else {
                doc! { "$elemMatch": { "$eq": operand } }.into()
            }
        }
        Comparison::NotInSet => {
            if fp.field.contains('.') {
                doc! { "$ne": operand }.into()
            } else {
                doc! { "$not": { "$elemMatch": { "$eq": operand } } }.into()
            }
        }
    };
    filter.insert(fp.field.clone(), condition);
    Ok(filter)
}

/// Translate an update spec into a native update document, plus the extra
/// filter clauses a positional update contributes.
pub(crate) fn update_to_wire(update: &UpdateSpec) -> Result<(BsonDocument, BsonDocument)> {
    let mut set_doc = BsonDocument::new();
    let mut push_doc = BsonDocument::new();
    let mut pull_doc = BsonDocument::new();
    let mut extra_filter = BsonDocument::new();
    let mut positional_used = false;

    for op in &update.ops {
        match op {
            UpdateOp::Set(fields) => {
                for (field, value) in fields {
                    set_doc.insert(field.clone(), to_bson(value)?);
                }
            }
            UpdateOp::Push { field, value } => {
                // A second append to the same field folds into $each to keep
                // one operator per field.
                let appended = to_bson(value)?;
                match push_doc.remove(field) {
                    None => {
                        push_doc.insert(field.clone(), appended);
                    }
                    Some(Bson::Document(mut each)) if each.contains_key("$each") => {
                        if let Some(Bson::Array(items)) = each.get_mut("$each") {
                            items.push(appended);
                        }
                        push_doc.insert(field.clone(), each);
                    }
                    Some(previous) => {
                        push_doc
                            .insert(field.clone(), doc! { "$each": [previous, appended] });
                    }
                }
            }
            UpdateOp::Pull { field, matcher } => {
                if pull_doc.contains_key(field.as_str()) {
                    return Err(StoreError::TranslationUnsupported(format!(
                        "multiple removals from '{}' in one update",
                        field
                    )));
                }
                pull_doc.insert(field.clone(), element_condition(matcher)?);
            }
            UpdateOp::PositionalSet {
                field,
                matcher,
                fields,
            } => {
                if positional_used {
                    return Err(StoreError::TranslationUnsupported(
                        "more than one positional array update per call".to_string(),
                    ));
                }
                positional_used = true;
                extra_filter.insert(field.clone(), element_condition(matcher)?);
                for (sub, value) in fields {
                    set_doc.insert(format!("{}.$.{}", field, sub), to_bson(value)?);
                }
            }
        }
    }

    let mut update_doc = BsonDocument::new();
    if !set_doc.is_empty() {
        update_doc.insert("$set", set_doc);
    }
    if !push_doc.is_empty() {
        update_doc.insert("$push", push_doc);
    }
    if !pull_doc.is_empty() {
        update_doc.insert("$pull", pull_doc);
    }
    Ok((update_doc, extra_filter))
}

/// Render an element matcher as the condition value `$pull` and positional
/// filters expect: a literal for scalar equality, a query document for
/// object elements.
fn element_condition(matcher: &ElementMatch) -> Result<Bson> {
    match matcher {
        ElementMatch::Equals(value) => to_bson(value),
        ElementMatch::Matches(predicate) => {
            Ok(Bson::Document(element_predicate_doc(predicate)?))
        }
    }
}

fn element_predicate_doc(predicate: &Predicate) -> Result<BsonDocument> {
    match predicate {
        Predicate::And(children) => {
            let mut merged = BsonDocument::new();
            for child in children {
                for (key, value) in element_predicate_doc(child)? {
                    if merged.contains_key(&key) {
                        return Err(StoreError::TranslationUnsupported(format!(
                            "repeated element constraint on '{}'",
                            key
                        )));
                    }
                    merged.insert(key, value);
                }
            }
            Ok(merged)
        }
        Predicate::Or(_) => Err(StoreError::TranslationUnsupported(
            "disjunction inside an array-element matcher".to_string(),
        )),
        Predicate::Field(fp) => match fp.op {
            Comparison::Eq | Comparison::Ne | Comparison::Gt | Comparison::Gte
            | Comparison::RegexCi => field_filter(fp),
            Comparison::InSet | Comparison::NotInSet => {
                Err(StoreError::TranslationUnsupported(
                    "membership operator inside an array-element matcher".to_string(),
                ))
            }
        },
    }
}

fn to_bson(value: &Value) -> Result<Bson> {
    bson::to_bson(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn document_to_row(document: &Document) -> Result<BsonDocument> {
    bson::to_document(document).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn row_to_document(mut row: BsonDocument) -> Result<Document> {
    // The server's own object id is transport detail; the application key
    // is `id`.
    row.remove("_id");
    let value =
        serde_json::to_value(&row).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Document::from_value(value)
}

fn map_driver_error(error: mongodb::error::Error) -> StoreError {
    match *error.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref write_error))
            if write_error.code == 11000 =>
        {
            StoreError::DuplicateKey(write_error.message.clone())
        }
        ErrorKind::Command(ref command_error) if command_error.code == 11000 => {
            StoreError::DuplicateKey(command_error.message.clone())
        }
        _ => StoreError::BackendUnavailable(error.to_string()),
    }
}
