mod state;

use crate::types::{ItemId, TransferId, TransferRecord};
use url::Url;

/// Fresh downloading record for `item`
fn record(item: &str) -> TransferRecord {
    TransferRecord::started(
        ItemId::from(item),
        TransferId::new(),
        Url::parse(&format!("https://feeds.example.com/{item}.mp3")).unwrap(),
    )
}
