//! Typed view of the `_bulk` API response.

use serde::Deserialize;

/// Result of one `_bulk` request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<BulkItem>,
}

/// One entry of the `items` array, keyed by the action that produced it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkItem {
    Index(BulkItemResult),
    Create(BulkItemResult),
    Update(BulkItemResult),
    Delete(BulkItemResult),
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkItemResult {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    pub status: u16,
    #[serde(default)]
    pub error: Option<BulkItemError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkItemError {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl BulkItem {
    pub fn result(&self) -> &BulkItemResult {
        match self {
            BulkItem::Index(r) | BulkItem::Create(r) | BulkItem::Update(r) | BulkItem::Delete(r) => r,
        }
    }

    pub fn is_failure(&self) -> bool {
        let result = self.result();
        result.error.is_some() || result.status >= 300
    }

    /// Index action result, mostly for building responses in tests.
    pub fn indexed(index: &str, id: Option<String>, status: u16) -> Self {
        BulkItem::Index(BulkItemResult {
            index: index.to_string(),
            id,
            status,
            error: None,
        })
    }

    /// Failed index action result.
    pub fn failed(index: &str, status: u16, kind: &str, reason: &str) -> Self {
        BulkItem::Index(BulkItemResult {
            index: index.to_string(),
            id: None,
            status,
            error: Some(BulkItemError {
                kind: kind.to_string(),
                reason: Some(reason.to_string()),
            }),
        })
    }
}

impl BulkResponse {
    pub fn has_failures(&self) -> bool {
        self.errors || self.items.iter().any(BulkItem::is_failure)
    }

    pub fn failed_count(&self) -> usize {
        self.items.iter().filter(|i| i.is_failure()).count()
    }

    /// Aggregated, one-line-per-item description of every failed item.
    pub fn build_failure_message(&self) -> String {
        let mut message = String::from("failure in bulk execution:");
        for (position, item) in self.items.iter().enumerate() {
            if !item.is_failure() {
                continue;
            }
            let result = item.result();
            let reason = result
                .error
                .as_ref()
                .map(|e| match &e.reason {
                    Some(reason) => format!("{}: {}", e.kind, reason),
                    None => e.kind.clone(),
                })
                .unwrap_or_else(|| format!("status {}", result.status));
            message.push_str(&format!(
                "\n[{}]: index [{}], id [{}], message [{}]",
                position,
                result.index,
                result.id.as_deref().unwrap_or(""),
                reason
            ));
        }
        message
    }
}
