//! A synchronous, read only HTTP store.

use std::{str::FromStr, sync::Arc};

use reqwest::{
    header::{HeaderValue, CONTENT_LENGTH, RANGE},
    StatusCode, Url,
};
use thiserror::Error;

use crate::{
    byte_range::ByteRange,
    storage::{
        storage_adapter::{RetryPolicy, RetryStorageAdapter},
        Bytes, MaybeBytes, ReadableStorageTraits, StorageError, StoreKey,
    },
};

/// A synchronous, read only HTTP store.
///
/// Each byte range is requested with a single part `Range` header.
/// Servers which ignore the header and respond with the whole value are also supported.
/// Connection failures, timeouts, `429` and `5xx` responses are reported as [`StorageError::Transient`].
#[derive(Debug)]
pub struct HTTPStore {
    base_url: Url,
    client: reqwest::blocking::Client,
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::Transient(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

impl From<url::ParseError> for StorageError {
    fn from(err: url::ParseError) -> Self {
        Self::Other(err.to_string())
    }
}

fn status_error(status: StatusCode, context: &str) -> StorageError {
    let message = format!("the http server responded with status {status} for {context}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StorageError::Transient(message)
    } else {
        StorageError::Other(message)
    }
}

impl HTTPStore {
    /// Create a new HTTP store at a given `base_url`.
    ///
    /// The store makes a single attempt per request and does not retry transient failures.
    /// Use [`HTTPStore::new_with_retry`] or wrap the store in a [`RetryStorageAdapter`] to retry them.
    ///
    /// # Errors
    ///
    /// Returns a [`HTTPStoreCreateError`] if `base_url` is not a valid URL.
    pub fn new(base_url: &str) -> Result<Self, HTTPStoreCreateError> {
        let base_url = Url::from_str(base_url)
            .map_err(|_| HTTPStoreCreateError::InvalidBaseURL(base_url.into()))?;
        let client = reqwest::blocking::Client::new();
        Ok(Self { base_url, client })
    }

    /// Create a new HTTP store at a given `base_url` which retries transient failures with `policy`.
    ///
    /// # Errors
    ///
    /// Returns a [`HTTPStoreCreateError`] if `base_url` is not a valid URL.
    pub fn new_with_retry(
        base_url: &str,
        policy: RetryPolicy,
    ) -> Result<RetryStorageAdapter<Self>, HTTPStoreCreateError> {
        Ok(RetryStorageAdapter::new_with_policy(
            Arc::new(Self::new(base_url)?),
            policy,
        ))
    }

    /// Maps a [`StoreKey`] to a HTTP [`Url`].
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn key_to_url(&self, key: &StoreKey) -> Result<Url, url::ParseError> {
        let base_url = self.base_url.as_str();
        let base_url = base_url.strip_suffix('/').unwrap_or(base_url);
        Url::parse(&format!("{base_url}/{}", key.as_str()))
    }

    fn get_range(&self, url: &Url, byte_range: &ByteRange) -> Result<MaybeBytes, StorageError> {
        if byte_range.explicit_length() == Some(0) {
            return Ok(Some(Bytes::new()));
        }
        let range = match byte_range.explicit_length() {
            Some(length) => format!("bytes={}-{}", byte_range.offset(), byte_range.offset() + length - 1),
            None => format!("bytes={}-", byte_range.offset()),
        };
        let range = HeaderValue::from_str(&range).map_err(|err| StorageError::Other(err.to_string()))?;
        let response = self.client.get(url.clone()).header(RANGE, range).send()?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::PARTIAL_CONTENT => {
                let bytes = response.bytes()?;
                match byte_range.explicit_length() {
                    Some(length) if bytes.len() as u64 != length => Err(StorageError::Other(format!(
                        "http partial content response for {url} has {} bytes, expected {length}",
                        bytes.len()
                    ))),
                    _ => Ok(Some(bytes)),
                }
            }
            StatusCode::OK => {
                // The server ignored the range header and returned the whole value
                let bytes = response.bytes()?;
                let range = byte_range.to_range_usize(bytes.len() as u64)?;
                Ok(Some(bytes.slice(range)))
            }
            StatusCode::RANGE_NOT_SATISFIABLE => Err(StorageError::Other(format!(
                "byte range {byte_range} is not satisfiable for {url}"
            ))),
            status => Err(status_error(status, "a byte range request")),
        }
    }
}

impl ReadableStorageTraits for HTTPStore {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        let url = self.key_to_url(key)?;
        let response = self.client.get(url).send()?;
        match response.status() {
            StatusCode::OK => Ok(Some(response.bytes()?)),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(status_error(status, "a get request")),
        }
    }

    fn get_partial_values_key(
        &self,
        key: &StoreKey,
        byte_ranges: &[ByteRange],
    ) -> Result<Option<Vec<Bytes>>, StorageError> {
        let url = self.key_to_url(key)?;
        let mut out = Vec::with_capacity(byte_ranges.len());
        for byte_range in byte_ranges {
            let Some(bytes) = self.get_range(&url, byte_range)? else {
                return Ok(None);
            };
            out.push(bytes);
        }
        Ok(Some(out))
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        let url = self.key_to_url(key)?;
        let response = self.client.head(url).send()?;
        match response.status() {
            StatusCode::OK => {
                let length = response
                    .headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|header_value| header_value.to_str().ok())
                    .and_then(|header_str| u64::from_str(header_str).ok())
                    .ok_or_else(|| StorageError::from("content length response is invalid"))?;
                Ok(Some(length))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(status_error(status, "a head request")),
        }
    }
}

/// A HTTP store creation error.
#[derive(Debug, Error)]
pub enum HTTPStoreCreateError {
    /// The URL is not valid.
    #[error("base URL {0} is not valid")]
    InvalidBaseURL(String),
}
