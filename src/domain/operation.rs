//! Payloads exchanged with the generation backend.

use serde::{Deserialize, Serialize};

/// Opaque identifier returned by the backend on submit.
pub type OperationName = String;

/// Response of a status check on a long-running operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub response: Option<OperationResponse>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    #[serde(default)]
    pub generated_videos: Vec<GeneratedVideo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedVideo {
    #[serde(default)]
    pub video: Option<VideoRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRef {
    #[serde(default)]
    pub uri: Option<String>,
}

impl OperationStatus {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn completed(uri: impl Into<String>) -> Self {
        Self {
            done: true,
            response: Some(OperationResponse {
                generated_videos: vec![GeneratedVideo {
                    video: Some(VideoRef {
                        uri: Some(uri.into()),
                    }),
                }],
            }),
        }
    }

    /// Done, but without anything to fetch.
    pub fn completed_empty() -> Self {
        Self {
            done: true,
            response: None,
        }
    }

    /// URI of the first generated asset, if the backend provided one.
    pub fn result_uri(&self) -> Option<&str> {
        self.response
            .as_ref()?
            .generated_videos
            .first()?
            .video
            .as_ref()?
            .uri
            .as_deref()
            .filter(|uri| !uri.is_empty())
    }
}

/// Response of the image model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImageResponse {
    #[serde(default)]
    pub image: Option<GeneratedImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    /// Base64 encoded image data.
    pub image_bytes: String,
    pub mime_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_uri_from_wire_payload() {
        let json = r#"{
            "name": "operations/abc",
            "done": true,
            "response": { "generatedVideos": [ { "video": { "uri": "files/xyz" } } ] }
        }"#;
        let status: OperationStatus = serde_json::from_str(json).unwrap();
        assert!(status.done);
        assert_eq!(status.result_uri(), Some("files/xyz"));
    }

    #[test]
    fn test_pending_and_empty_payloads() {
        let status: OperationStatus = serde_json::from_str(r#"{"name":"op"}"#).unwrap();
        assert!(!status.done);
        assert_eq!(status.result_uri(), None);

        let status: OperationStatus =
            serde_json::from_str(r#"{"done":true,"response":{"generatedVideos":[]}}"#).unwrap();
        assert!(status.done);
        assert_eq!(status.result_uri(), None);

        let status: OperationStatus = serde_json::from_str(
            r#"{"done":true,"response":{"generatedVideos":[{"video":{"uri":""}}]}}"#,
        )
        .unwrap();
        assert_eq!(status.result_uri(), None);
    }
}
