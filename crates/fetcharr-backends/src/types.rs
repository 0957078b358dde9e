use serde::{Deserialize, Serialize};

/// Tag as exposed by the *arr APIs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub id: i32,
    pub label: String,
}
