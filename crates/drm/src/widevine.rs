// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Widevine-style remote key source.
//!
//! A background task posts signed JSON requests to the license service and
//! pushes decoded key maps into a bounded producer/consumer pool, one map
//! per crypto period. Consumers peek the pool at the period index they
//! need; the pool's window sliding keeps long rotation runs in bounded
//! memory. Transient server errors (`status == "INTERNAL_ERROR"`) are
//! retried with exponential backoff; any other failure stops the pool and
//! is returned to every waiting consumer.

use crate::fetcher::{HttpFetcher, UrlFetcher};
use crate::key_source::{EncryptionKey, KeySource, TrackType, NUM_VALID_TRACK_TYPES};
use crate::pssh::pssh_box_from_data;
use crate::signer::RequestSigner;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use packkit_core::{PackKitError, ProducerConsumerQueue, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

const LICENSE_STATUS_OK: &str = "OK";
// The server may return INTERNAL_ERROR intermittently; the next request may
// succeed without problem.
const LICENSE_STATUS_TRANSIENT_ERROR: &str = "INTERNAL_ERROR";

/// Retries for transient license-server errors.
const NUM_TRANSIENT_ERROR_RETRIES: u32 = 5;
const FIRST_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Keys fetched per rotation request when not configured otherwise.
pub const DEFAULT_CRYPTO_PERIOD_COUNT: u32 = 10;

/// How long a consumer waits for its crypto period to materialize.
const GET_KEY_TIMEOUT: Duration = Duration::from_secs(5 * 60);

type EncryptionKeyMap = HashMap<TrackType, EncryptionKey>;
type KeyPool = ProducerConsumerQueue<Arc<EncryptionKeyMap>>;

/// Key-rotation configuration for the remote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRotation {
    Disabled,
    Enabled { first_crypto_period_index: u32, crypto_period_count: u32 },
}

impl KeyRotation {
    /// Rotation starting at `first_crypto_period_index` with the default
    /// period count.
    pub const fn enabled(first_crypto_period_index: u32) -> Self {
        Self::Enabled {
            first_crypto_period_index,
            crypto_period_count: DEFAULT_CRYPTO_PERIOD_COUNT,
        }
    }
}

struct FetchContext {
    server_url: String,
    content_id: Vec<u8>,
    policy: String,
    signer: Box<dyn RequestSigner>,
    fetcher: Box<dyn HttpFetcher>,
    rotation: KeyRotation,
    key_pool: Arc<KeyPool>,
}

/// Talks to a Widevine-style license service to acquire encryption keys.
pub struct WidevineKeySource {
    key_pool: Arc<KeyPool>,
    fetch_error: Arc<Mutex<Option<PackKitError>>>,
    rotation_enabled: bool,
    fetch_task: Option<JoinHandle<()>>,
}

impl WidevineKeySource {
    /// Create the source and start fetching immediately.
    ///
    /// `content_id` identifies the content to the service; `policy` names
    /// the content rights and is forwarded verbatim.
    pub fn new(
        server_url: &str,
        content_id: Vec<u8>,
        policy: String,
        signer: Box<dyn RequestSigner>,
        rotation: KeyRotation,
    ) -> Result<Self> {
        Ok(Self::with_fetcher(
            server_url,
            content_id,
            policy,
            signer,
            rotation,
            Box::new(UrlFetcher::new()?),
        ))
    }

    /// [`new`](Self::new) with an injected HTTP fetcher, mainly for tests.
    pub fn with_fetcher(
        server_url: &str,
        content_id: Vec<u8>,
        policy: String,
        signer: Box<dyn RequestSigner>,
        rotation: KeyRotation,
        fetcher: Box<dyn HttpFetcher>,
    ) -> Self {
        let (rotation_enabled, starting_pos, pool_capacity) = match rotation {
            KeyRotation::Disabled => (false, 0, DEFAULT_CRYPTO_PERIOD_COUNT),
            KeyRotation::Enabled { first_crypto_period_index, crypto_period_count } => {
                (true, first_crypto_period_index, crypto_period_count.max(1))
            },
        };
        let key_pool = Arc::new(KeyPool::with_starting_pos(
            pool_capacity as usize,
            u64::from(starting_pos),
        ));
        let fetch_error = Arc::new(Mutex::new(None));

        let context = FetchContext {
            server_url: server_url.to_string(),
            content_id,
            policy,
            signer,
            fetcher,
            rotation,
            key_pool: Arc::clone(&key_pool),
        };
        let task_error = Arc::clone(&fetch_error);
        let task_pool = Arc::clone(&key_pool);
        let fetch_task = tokio::spawn(async move {
            let status = fetch_keys_task(&context).await;
            if let Err(error) = status {
                tracing::error!("key fetching stopped: {error}");
                #[allow(clippy::unwrap_used)]
                task_error.lock().unwrap().replace(error);
            }
            task_pool.stop();
        });

        Self { key_pool, fetch_error, rotation_enabled, fetch_task: Some(fetch_task) }
    }

    /// Stop the key pool and wait for the fetch task to wind down.
    pub async fn shutdown(mut self) {
        self.key_pool.stop();
        if let Some(task) = self.fetch_task.take() {
            let _ = task.await;
        }
    }

    #[allow(clippy::unwrap_used)] // lock poisoning is a programmer error
    async fn get_key_internal(
        &self,
        crypto_period_index: u32,
        track_type: TrackType,
    ) -> Result<EncryptionKey> {
        let key_map = match self
            .key_pool
            .peek(u64::from(crypto_period_index), Some(GET_KEY_TIMEOUT))
            .await
        {
            Ok(key_map) => key_map,
            Err(PackKitError::Stopped) => {
                let sticky = self.fetch_error.lock().unwrap().clone();
                return Err(sticky.unwrap_or(PackKitError::Stopped));
            },
            Err(other) => return Err(other),
        };
        key_map.get(&track_type).cloned().ok_or_else(|| {
            PackKitError::Internal(format!("cannot find key of type {}", track_type.as_str()))
        })
    }
}

impl Drop for WidevineKeySource {
    fn drop(&mut self) {
        self.key_pool.stop();
        if let Some(task) = self.fetch_task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl KeySource for WidevineKeySource {
    async fn get_key(&self, track_type: TrackType) -> Result<EncryptionKey> {
        if self.rotation_enabled {
            return Err(PackKitError::InvalidArgument(
                "key rotation is enabled; use get_crypto_period_key".to_string(),
            ));
        }
        self.get_key_internal(0, track_type).await
    }

    async fn get_crypto_period_key(
        &self,
        crypto_period_index: u32,
        track_type: TrackType,
    ) -> Result<EncryptionKey> {
        if !self.rotation_enabled {
            return Err(PackKitError::InvalidArgument(
                "key rotation is disabled; use get_key".to_string(),
            ));
        }
        self.get_key_internal(crypto_period_index, track_type).await
    }
}

/// The fetch loop run by the background task.
async fn fetch_keys_task(context: &FetchContext) -> Result<()> {
    match context.rotation {
        KeyRotation::Disabled => fetch_keys(context, 0).await,
        KeyRotation::Enabled { first_crypto_period_index, crypto_period_count } => {
            let mut first_index = first_crypto_period_index;
            loop {
                fetch_keys(context, first_index).await?;
                first_index += crypto_period_count;
            }
        },
    }
}

enum ExtractOutcome {
    Done,
    TransientError,
}

async fn fetch_keys(context: &FetchContext, first_crypto_period_index: u32) -> Result<()> {
    let request = fill_request(context, first_crypto_period_index);
    let message = sign_request(context, &request)?;
    tracing::debug!("license request message: {message}");

    let mut sleep_duration = FIRST_RETRY_DELAY;

    // Client-side retries work around transient server errors.
    for attempt in 0..NUM_TRANSIENT_ERROR_RETRIES {
        let raw_response = context.fetcher.post(&context.server_url, &message).await?;
        tracing::debug!("retry [{attempt}] response: {raw_response}");

        let response = decode_response(&raw_response)?;

        match extract_encryption_keys(context, first_crypto_period_index, &response).await? {
            ExtractOutcome::Done => return Ok(()),
            ExtractOutcome::TransientError => {},
        }

        if attempt != NUM_TRANSIENT_ERROR_RETRIES - 1 {
            tokio::time::sleep(sleep_duration).await;
            sleep_duration *= 2;
        }
    }
    Err(PackKitError::Server(
        "failed to recover from server internal error".to_string(),
    ))
}

fn fill_request(context: &FetchContext, first_crypto_period_index: u32) -> String {
    let mut request = json!({
        "content_id": BASE64.encode(&context.content_id),
        "policy": context.policy,
        "tracks": [
            {"type": "SD"},
            {"type": "HD"},
            {"type": "AUDIO"},
        ],
        "drm_types": ["WIDEVINE"],
    });

    if let KeyRotation::Enabled { crypto_period_count, .. } = context.rotation {
        request["first_crypto_period_index"] = json!(first_crypto_period_index);
        request["crypto_period_count"] = json!(crypto_period_count);
    }

    request.to_string()
}

fn sign_request(context: &FetchContext, request: &str) -> Result<String> {
    let signature = context
        .signer
        .generate_signature(request.as_bytes())
        .map_err(|_| PackKitError::Internal("signature generation failed".to_string()))?;

    Ok(json!({
        "request": BASE64.encode(request),
        "signature": BASE64.encode(signature),
        "signer": context.signer.signer_name(),
    })
    .to_string())
}

/// Extract the base64 license payload from the JSON envelope.
fn decode_response(raw_response: &str) -> Result<String> {
    let decode = || -> Option<String> {
        let envelope: Value = serde_json::from_str(raw_response).ok()?;
        let response_base64 = envelope.get("response")?.as_str()?;
        let decoded = BASE64.decode(response_base64).ok()?;
        String::from_utf8(decoded).ok()
    };
    decode().ok_or_else(|| {
        PackKitError::Server(format!("failed to decode response '{raw_response}'"))
    })
}

fn base64_field(track: &Value, field: &str) -> Option<Vec<u8>> {
    BASE64.decode(track.get(field)?.as_str()?).ok()
}

fn extract_pssh_data(track: &Value) -> Option<Vec<u8>> {
    let pssh_list = track.get("pssh")?.as_array()?;
    let pssh = pssh_list.first()?;
    if pssh.get("drm_type")?.as_str()? != "WIDEVINE" {
        tracing::error!("expecting drm_type 'WIDEVINE', got {:?}", pssh.get("drm_type"));
        return None;
    }
    base64_field(pssh, "data")
}

async fn extract_encryption_keys(
    context: &FetchContext,
    first_crypto_period_index: u32,
    response: &str,
) -> Result<ExtractOutcome> {
    let extraction_failed = || {
        PackKitError::Server(format!("failed to extract encryption key from '{response}'"))
    };

    let license: Value =
        serde_json::from_str(response).map_err(|_| extraction_failed())?;

    let license_status = license
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(extraction_failed)?;
    if license_status != LICENSE_STATUS_OK {
        tracing::error!("received non-OK license response: {response}");
        if license_status == LICENSE_STATUS_TRANSIENT_ERROR {
            return Ok(ExtractOutcome::TransientError);
        }
        return Err(extraction_failed());
    }

    let tracks = license
        .get("tracks")
        .and_then(Value::as_array)
        .ok_or_else(extraction_failed)?;
    let expected_tracks = match context.rotation {
        KeyRotation::Disabled => NUM_VALID_TRACK_TYPES,
        KeyRotation::Enabled { crypto_period_count, .. } => {
            NUM_VALID_TRACK_TYPES * crypto_period_count as usize
        },
    };
    if tracks.len() < expected_tracks {
        return Err(extraction_failed());
    }

    let mut current_crypto_period_index = first_crypto_period_index;
    let mut key_map = EncryptionKeyMap::new();

    for track in tracks {
        if let KeyRotation::Enabled { .. } = context.rotation {
            let crypto_period_index = track
                .get("crypto_period_index")
                .and_then(Value::as_u64)
                .ok_or_else(extraction_failed)?;
            if crypto_period_index != u64::from(current_crypto_period_index) {
                if crypto_period_index != u64::from(current_crypto_period_index) + 1 {
                    tracing::error!(
                        "expecting crypto period index {current_crypto_period_index} or {}; seen {crypto_period_index}",
                        current_crypto_period_index + 1,
                    );
                    return Err(extraction_failed());
                }
                push_to_key_pool(&context.key_pool, &mut key_map).await?;
                current_crypto_period_index += 1;
            }
        }

        let track_type = track
            .get("type")
            .and_then(Value::as_str)
            .map(TrackType::from_str)
            .ok_or_else(extraction_failed)?;
        if track_type == TrackType::Unknown || key_map.contains_key(&track_type) {
            return Err(extraction_failed());
        }

        let key_id = base64_field(track, "key_id").ok_or_else(extraction_failed)?;
        let key = base64_field(track, "key").ok_or_else(extraction_failed)?;
        let pssh_data = extract_pssh_data(track).ok_or_else(extraction_failed)?;

        key_map.insert(
            track_type,
            EncryptionKey { key_id, key, iv: Vec::new(), pssh: pssh_box_from_data(&pssh_data) },
        );
    }

    if key_map.is_empty() {
        return Err(extraction_failed());
    }
    push_to_key_pool(&context.key_pool, &mut key_map).await?;
    Ok(ExtractOutcome::Done)
}

async fn push_to_key_pool(key_pool: &KeyPool, key_map: &mut EncryptionKeyMap) -> Result<()> {
    let map = Arc::new(std::mem::take(key_map));
    key_pool.push(map, None).await
}
