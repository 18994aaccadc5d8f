//! Index settings and field mapping applied on creation.

use serde_json::{Value, json};

/// Body of the `PUT /{index}` request.
pub fn index_body(dimension: usize) -> Value {
    json!({
        "settings": {
            "index": {
                "number_of_shards": 3,
                "number_of_replicas": 1,
                "refresh_interval": "30s",
                "max_result_window": 10000,
                "knn": true,
                "knn.algo_param.ef_search": 512
            }
        },
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "content": { "type": "text" },
                "embedding_vector": {
                    "type": "knn_vector",
                    "dimension": dimension,
                    "method": {
                        "name": "hnsw",
                        "space_type": "cosinesimil",
                        "engine": "nmslib",
                        "parameters": {
                            "ef_construction": 512,
                            "m": 16
                        }
                    }
                },
                "filename": { "type": "keyword" },
                "position": { "type": "integer" },
                "tokens": { "type": "integer" },
                "section_title": {
                    "type": "text",
                    "fields": {
                        "keyword": { "type": "keyword" }
                    }
                },
                "type": { "type": "keyword" },
                "heading_level": { "type": "integer" },
                "content_json": {
                    "type": "object",
                    "enabled": false
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_field_uses_hnsw_cosine() {
        let body = index_body(1024);
        let vector = &body["mappings"]["properties"]["embedding_vector"];
        assert_eq!(vector["dimension"], 1024);
        assert_eq!(vector["method"]["space_type"], "cosinesimil");
        assert_eq!(vector["method"]["parameters"]["m"], 16);
        assert_eq!(body["settings"]["index"]["knn"], true);
        assert_eq!(body["settings"]["index"]["number_of_shards"], 3);
    }
}
