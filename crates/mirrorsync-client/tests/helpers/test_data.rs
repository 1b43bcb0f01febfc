//! JSON fixtures shaped like the source and target APIs.

#![allow(dead_code)]

use serde_json::{json, Value};

pub const DOI: &str = "doi:10.5061/dryad.abc123";
/// `DOI` as it appears in a request path.
pub const DOI_ENCODED: &str = "doi%3A10.5061%2Fdryad.abc123";
pub const PID: &str = "doi:10.80240/FK2/XYZ";
pub const API_KEY: &str = "test-api-key";

pub fn dataset(modified: &str, version_id: u64) -> Value {
    json!({
        "identifier": DOI,
        "title": "Pollinator visitation",
        "abstract": "Counts of bees.",
        "lastModificationDate": modified,
        "authors": [{"firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.org"}],
        "_links": {
            "stash:version": {"href": format!("/api/v2/versions/{version_id}")}
        }
    })
}

pub fn listed_file(id: u64, path: &str, size: u64, digest: Option<&str>) -> Value {
    let mut file = json!({
        "path": path,
        "mimeType": "text/csv",
        "size": size,
        "_links": {
            "stash:file-download": {"href": format!("/api/v2/files/{id}/download")}
        }
    });
    if let Some(digest) = digest {
        file["digestType"] = json!("md5");
        file["digest"] = json!(digest);
    }
    file
}

pub fn file_page(files: Vec<Value>, total: u64) -> Value {
    json!({"total": total, "_embedded": {"stash:files": files}})
}

pub fn search_page(ids: &[&str], total: u64) -> Value {
    let datasets: Vec<Value> = ids.iter().map(|id| json!({"identifier": id})).collect();
    json!({"total": total, "count": ids.len(), "_embedded": {"stash:datasets": datasets}})
}

pub fn upload_response(file_id: u64, md5: &str) -> Value {
    json!({
        "status": "OK",
        "data": {"files": [{
            "description": "",
            "label": "a.txt",
            "dataFile": {
                "id": file_id,
                "contentType": "text/plain",
                "checksum": {"type": "MD5", "value": md5}
            }
        }]}
    })
}
