//! Source dataset JSON to target citation metadata.
//!
//! Only the fields the target requires (plus description and keywords) are
//! carried over. Everything else stays in the ledger snapshot.

use serde_json::{json, Map, Value};

use mirrorsync_core::{SourceRecord, SyncError, SyncResult, Transformer};

const CC0_NAME: &str = "CC0 1.0";
const CC0_URI: &str = "http://creativecommons.org/publicdomain/zero/1.0";

fn primitive(type_name: &str, value: impl Into<Value>) -> Value {
    let value: Value = value.into();
    json!({"typeName": type_name, "multiple": false, "typeClass": "primitive", "value": value})
}

fn compound(type_name: &str, values: Vec<Value>) -> Value {
    json!({"typeName": type_name, "multiple": true, "typeClass": "compound", "value": values})
}

fn text<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Fallback contact used when no author lists an email address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultContact {
    pub name: String,
    pub email: String,
}

/// Wraps source metadata into the target's dataset envelope.
#[derive(Debug, Clone, Default)]
pub struct DatasetEnvelopeTransformer {
    default_contact: Option<DefaultContact>,
}

impl DatasetEnvelopeTransformer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_default_contact(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.default_contact = Some(DefaultContact {
            name: name.into(),
            email: email.into(),
        });
        self
    }

    fn authors(metadata: &Value) -> Vec<Value> {
        let Some(authors) = metadata.get("authors").and_then(Value::as_array) else {
            return Vec::new();
        };
        authors
            .iter()
            .filter_map(|author| {
                let name = match (text(author, "lastName"), text(author, "firstName")) {
                    (Some(last), Some(first)) => format!("{last}, {first}"),
                    (Some(last), None) => last.to_string(),
                    (None, Some(first)) => first.to_string(),
                    (None, None) => return None,
                };
                let mut entry = Map::new();
                entry.insert("authorName".into(), primitive("authorName", name));
                if let Some(affiliation) = text(author, "affiliation") {
                    entry.insert(
                        "authorAffiliation".into(),
                        primitive("authorAffiliation", affiliation),
                    );
                }
                if let Some(orcid) = text(author, "orcid") {
                    entry.insert(
                        "authorIdentifierScheme".into(),
                        json!({
                            "typeName": "authorIdentifierScheme",
                            "multiple": false,
                            "typeClass": "controlledVocabulary",
                            "value": "ORCID"
                        }),
                    );
                    entry.insert("authorIdentifier".into(), primitive("authorIdentifier", orcid));
                }
                Some(Value::Object(entry))
            })
            .collect()
    }

    fn contacts(&self, metadata: &Value) -> Vec<Value> {
        let contact = |name: &str, email: &str| {
            json!({
                "datasetContactName": primitive("datasetContactName", name),
                "datasetContactEmail": primitive("datasetContactEmail", email),
            })
        };
        let mut contacts: Vec<Value> = metadata
            .get("authors")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|author| {
                let email = text(author, "email")?;
                let name = [text(author, "lastName"), text(author, "firstName")]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(", ");
                Some(contact(&name, email))
            })
            .collect();
        if contacts.is_empty() {
            if let Some(default) = &self.default_contact {
                contacts.push(contact(&default.name, &default.email));
            }
        }
        contacts
    }
}

impl Transformer for DatasetEnvelopeTransformer {
    fn to_target_metadata(&self, record: &SourceRecord) -> SyncResult<Value> {
        let metadata = &record.metadata;
        let title = text(metadata, "title").ok_or_else(|| {
            SyncError::InvalidData(format!("{} has no title", record.external_id))
        })?;

        let mut fields = vec![
            primitive("title", title),
            json!({
                "typeName": "subject",
                "multiple": true,
                "typeClass": "controlledVocabulary",
                "value": ["Other"]
            }),
        ];

        let authors = Self::authors(metadata);
        if !authors.is_empty() {
            fields.push(compound("author", authors));
        }
        let contacts = self.contacts(metadata);
        if !contacts.is_empty() {
            fields.push(compound("datasetContact", contacts));
        }
        if let Some(abstract_text) = text(metadata, "abstract") {
            fields.push(compound(
                "dsDescription",
                vec![json!({"dsDescriptionValue": primitive("dsDescriptionValue", abstract_text)})],
            ));
        }
        let keywords: Vec<Value> = metadata
            .get("keywords")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(|k| json!({"keywordValue": primitive("keywordValue", k)}))
            .collect();
        if !keywords.is_empty() {
            fields.push(compound("keyword", keywords));
        }

        Ok(json!({
            "datasetVersion": {
                "license": {"name": CC0_NAME, "uri": CC0_URI},
                "metadataBlocks": {
                    "citation": {
                        "displayName": "Citation Metadata",
                        "fields": fields
                    }
                }
            }
        }))
    }
}
