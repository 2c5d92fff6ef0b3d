//! Shared domain value types.

use serde::{Deserialize, Serialize};

/// Identity of the account reading a feed.
///
/// The upstream authenticator hands us a raw account id where `0` (or no id
/// at all) means the request is anonymous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Viewer {
    Anonymous,
    Account(i64),
}

impl Viewer {
    pub fn from_raw(id: Option<i64>) -> Self {
        match id {
            Some(id) if id > 0 => Viewer::Account(id),
            _ => Viewer::Anonymous,
        }
    }

    pub fn account_id(self) -> Option<i64> {
        match self {
            Viewer::Account(id) => Some(id),
            Viewer::Anonymous => None,
        }
    }

    pub fn is_anonymous(self) -> bool {
        matches!(self, Viewer::Anonymous)
    }
}
