//! Descriptor fixtures and mock service responses

use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Descriptor directory under an install root
pub fn descriptor_dir(root: &Path) -> PathBuf {
    root.join("config").join("stplug-in")
}

/// Write `{item}.lua` referencing `depots` the way real descriptors do
pub fn write_descriptor(root: &Path, item: u64, depots: &[u64]) -> PathBuf {
    let dir = descriptor_dir(root);
    std::fs::create_dir_all(&dir).expect("Failed to create descriptor directory");

    let mut body = format!("-- manifest for {item}\naddappid({item})\n");
    for depot in depots {
        body.push_str(&format!(
            "addappid({depot}, 1, \"5f6c1c8a3d2b9e7f0a4c6d8e1b3f5a7c9e0d2f4b6a8c0e2d4f6b8a0c2e4d6f8a\")\n"
        ));
        body.push_str(&format!("setManifestid({depot}, \"0\", 0)\n"));
    }

    let file = dir.join(format!("{item}.lua"));
    std::fs::write(&file, body).expect("Failed to write descriptor");
    file
}

/// Info service body for `item` with a public gid for each listed depot
pub fn info_body(item: u64, gids: &[(u64, &str)]) -> Value {
    let depots: Map<String, Value> = gids
        .iter()
        .map(|(depot, gid)| {
            (
                depot.to_string(),
                json!({ "manifests": { "public": { "gid": gid, "size": "1024" } } }),
            )
        })
        .collect();
    json!({
        "status": "success",
        "data": { item.to_string(): { "depots": depots } }
    })
}

/// Serve [`info_body`] for `item`
pub async fn mount_info(server: &MockServer, item: u64, gids: &[(u64, &str)]) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/info/{item}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(info_body(item, gids)))
        .mount(server)
        .await;
}

/// Serve `bytes` for every manifest request of `depot`
pub async fn mount_manifest(server: &MockServer, depot: u64, bytes: &[u8]) {
    Mock::given(method("GET"))
        .and(path("/manifest"))
        .and(query_param("depotid", depot.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes.to_vec()))
        .mount(server)
        .await;
}

/// Serve a store name for `item`
pub async fn mount_name(server: &MockServer, item: u64, name: &str) {
    Mock::given(method("GET"))
        .and(path("/api/appdetails"))
        .and(query_param("appids", item.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            item.to_string(): { "success": true, "data": { "name": name } }
        })))
        .mount(server)
        .await;
}
