//! Paginated object listing.
//!
//! Listing calls return one page of keys plus an opaque continuation token;
//! [`list_all_keys`] drives the token loop until the listing is drained. The
//! seam is a trait so the loop can be exercised against synthetic multi-page
//! fixtures.

use crate::error::StorageError;
use crate::storage::StorageProvider;

/// One page of a listing response.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Keys in the order the storage service returned them.
    pub keys: Vec<String>,
    /// Opaque cursor; `None` means this was the last page.
    pub next_token: Option<String>,
}

/// A listing collaborator that serves keys one page at a time.
#[allow(async_fn_in_trait)]
pub trait ListObjectPages {
    async fn list_page(
        &self,
        prefix: &str,
        token: Option<String>,
    ) -> Result<ListPage, StorageError>;
}

impl ListObjectPages for StorageProvider {
    /// object_store drives the continuation-token protocol internally, so
    /// the fully drained listing arrives here as a single page.
    async fn list_page(
        &self,
        prefix: &str,
        _token: Option<String>,
    ) -> Result<ListPage, StorageError> {
        let keys = self.list_keys(prefix).await?;
        Ok(ListPage {
            keys,
            next_token: None,
        })
    }
}

/// Accumulate every page under `prefix` into one key list.
///
/// The result equals the concatenation of all pages in service order; no key
/// is dropped or duplicated regardless of how the listing is paged. Errors
/// propagate to the caller; retrying is the storage client's job.
pub async fn list_all_keys<L: ListObjectPages>(
    lister: &L,
    prefix: &str,
) -> Result<Vec<String>, StorageError> {
    let mut keys = Vec::new();
    let mut token = None;

    loop {
        let page = lister.list_page(prefix, token).await?;
        keys.extend(page.keys);

        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    Ok(keys)
}
