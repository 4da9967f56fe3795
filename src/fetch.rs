// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Getting container bytes.

Workers fetch through the [`Fetch`] trait so applications can plug in their own transport
(HTTP, an asset pack, ...).  [`FileFetch`] reads local paths and `file://` URLs.

Fetches are never retried here; a failure becomes [`Error::TransportFailure`].
*/

use crate::error::Error;
use std::path::PathBuf;

/// Retrieves the bytes behind a URL.
///
/// Called from worker threads, so implementations block until the bytes are available.
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, Error>;
}

/// Reads files through `async_file`.
#[derive(Debug, Clone)]
pub struct FileFetch {
    priority: async_file::Priority,
}

impl FileFetch {
    pub fn new(priority: async_file::Priority) -> Self {
        FileFetch { priority }
    }

    /// Resolves a path or `file://` URL.  Other schemes are refused.
    pub fn path_for(url: &str) -> Result<PathBuf, Error> {
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(PathBuf::from(path));
        }
        match url.split_once("://") {
            Some((scheme, _)) => Err(Error::TransportFailure(format!(
                "{scheme} URLs can't be read from the file system"
            ))),
            None => Ok(PathBuf::from(url)),
        }
    }

    pub async fn fetch_async(&self, url: &str) -> Result<Vec<u8>, Error> {
        let path = Self::path_for(url)?;
        let file = async_file::File::open(&path, self.priority)
            .await
            .map_err(|e| Error::TransportFailure(format!("{}: {e:?}", path.display())))?;
        let data = file
            .read_all(self.priority)
            .await
            .map_err(|e| Error::TransportFailure(format!("{}: {e:?}", path.display())))?;
        logwise::trace_sync!(
            "fetched {len} bytes from {url}",
            len = data.len(),
            url = logwise::privacy::LogIt(url)
        );
        Ok(data.to_vec())
    }
}

impl Fetch for FileFetch {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, Error> {
        test_executors::sleep_on(self.fetch_async(url))
    }
}
