//! Chunked transfer of requests too large for a single call.
//!
//! The client filter splits an oversized request into `.multi` calls that
//! share a transaction id; the server filter reassembles them in the
//! caller's session and dispatches the real method once the last chunk
//! arrives.

use std::sync::Arc;

use burrow_wire::{Guid, MessageStatus, MultiPartRequest, MultiPartResponse, METHOD_MULTI};

use crate::ambient;
use crate::config::{DEFAULT_MAX_MULTI_PART_BYTES, MIN_MULTI_PART_THRESHOLD};
use crate::dispatch::{decode_request, encode_response, CallDispatch, Dispatch};
use crate::error::RpcError;
use crate::exception::{Fault, InvalidDataError, MissingMethodError, ReplayException};

/// Bytes of every chunk left for the request header.
pub const RESERVED_HEADER_BYTES: usize = 1024;

/// Client-side filter: requests of at least `threshold` bytes go out in
/// chunks of `threshold - RESERVED_HEADER_BYTES`.
#[derive(Debug)]
pub struct MultiPartClient<D> {
    next: D,
    threshold: usize,
}

impl<D: CallDispatch> MultiPartClient<D> {
    pub fn new(next: D, threshold: usize) -> Result<Self, RpcError> {
        if threshold < MIN_MULTI_PART_THRESHOLD {
            return Err(RpcError::configuration(format!(
                "multi-part threshold must be at least {MIN_MULTI_PART_THRESHOLD} bytes, \
                 got {threshold}"
            )));
        }
        Ok(Self { next, threshold })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn chunk_size(&self) -> usize {
        self.threshold - RESERVED_HEADER_BYTES
    }

    pub fn inner(&self) -> &D {
        &self.next
    }

    pub fn into_inner(self) -> D {
        self.next
    }

    fn transfer(
        &self,
        transaction_id: Guid,
        method: &str,
        request: &[u8],
        status: &mut MessageStatus,
    ) -> Result<Vec<u8>, RpcError> {
        let total = request.len();
        let mut position = 0usize;
        for chunk in request.chunks(self.chunk_size()) {
            let last = position + chunk.len() == total;
            if last {
                *status = MessageStatus::Complete;
            }
            let message = MultiPartRequest {
                transaction_id,
                method: method.to_string(),
                status: *status,
                current_position: position as u64,
                bytes_sent: chunk.len() as u64,
                total_bytes: total as u64,
                payload: chunk.to_vec(),
            };
            let response: MultiPartResponse = self
                .next
                .call(METHOD_MULTI, &message)
                .map_err(|err| missing_handler(err, position))?;
            if !response.proceed {
                return Err(RpcError::protocol(
                    "the multi-part transfer was canceled by the server",
                ));
            }
            position += chunk.len();
            log::debug!("multi-part {transaction_id}: sent {position}/{total} bytes");
            if last {
                return response
                    .response_bytes
                    .ok_or_else(|| RpcError::protocol("the server did not provide a response"));
            }
        }
        Err(RpcError::protocol("multi-part transfer ended without a final chunk"))
    }

    fn cancel(&self, transaction_id: Guid) {
        let result: Result<MultiPartResponse, RpcError> =
            self.next.call(METHOD_MULTI, &MultiPartRequest::cancel(transaction_id));
        if let Err(err) = result {
            log::warn!("multi-part {transaction_id}: unable to cancel transfer: {err}");
        }
    }
}

/// A server that never had the filter enabled answers the first chunk with
/// a missing-method error.
fn missing_handler(err: RpcError, position: usize) -> RpcError {
    let missing = err.remote().is_some_and(|remote| {
        remote.is::<MissingMethodError>()
            || remote.info().full_type_name.as_deref() == Some(MissingMethodError::TYPE_NAME)
    });
    if missing && position == 0 {
        RpcError::configuration("the server has no multi-part handler registered")
    } else {
        err
    }
}

impl<D: CallDispatch> CallDispatch for MultiPartClient<D> {
    fn call_raw(&self, method: &str, request: &[u8]) -> Result<Vec<u8>, RpcError> {
        if request.len() < self.threshold {
            return self.next.call_raw(method, request);
        }

        let transaction_id = Guid::new_random();
        log::debug!(
            "multi-part {transaction_id}: {method} with {} bytes in chunks of {}",
            request.len(),
            self.chunk_size()
        );
        let mut status = MessageStatus::Continue;
        let result = self.transfer(transaction_id, method, request, &mut status);
        if result.is_err() && status == MessageStatus::Continue {
            self.cancel(transaction_id);
        }
        result
    }
}

/// Receive buffer of one in-flight transfer, stored in the caller's session.
struct TransferBuffer {
    total: usize,
    data: Vec<u8>,
}

fn invalid(message: &str) -> Fault {
    InvalidDataError::new(message).into()
}

/// Server-side filter: handles `.multi` and forwards everything else.
pub struct MultiPartServer {
    next: Arc<dyn Dispatch>,
    max_message_bytes: u64,
}

impl std::fmt::Debug for MultiPartServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiPartServer")
            .field("max_message_bytes", &self.max_message_bytes)
            .finish_non_exhaustive()
    }
}

impl MultiPartServer {
    pub fn new(next: impl Dispatch + 'static) -> Self {
        Self::from_arc(Arc::new(next))
    }

    pub fn from_arc(next: Arc<dyn Dispatch>) -> Self {
        Self { next, max_message_bytes: DEFAULT_MAX_MULTI_PART_BYTES }
    }

    /// Largest reassembled request accepted.
    pub fn with_max_message_bytes(mut self, max_message_bytes: u64) -> Self {
        self.max_message_bytes = max_message_bytes;
        self
    }

    fn receive(&self, request: MultiPartRequest) -> Result<MultiPartResponse, Fault> {
        let session = ambient::session()?;
        let key = request.transaction_id.to_base64();
        let transaction_id = request.transaction_id;

        let mut buffer = match session.take::<TransferBuffer>(&key) {
            Ok(buffer) => buffer,
            Err(_) => {
                if request.status == MessageStatus::Cancel {
                    return Ok(MultiPartResponse::stop());
                }
                if request.current_position != 0 {
                    return Err(invalid("the transaction id is not valid"));
                }
                if request.total_bytes > self.max_message_bytes {
                    return Err(invalid("the multi-part message exceeds the allowed size"));
                }
                let total = usize::try_from(request.total_bytes)
                    .map_err(|_| invalid("the multi-part message exceeds the allowed size"))?;
                log::debug!("multi-part {transaction_id}: receiving {total} bytes");
                TransferBuffer { total, data: Vec::with_capacity(total) }
            }
        };

        if request.status == MessageStatus::Cancel {
            log::debug!("multi-part {transaction_id}: canceled by client");
            return Ok(MultiPartResponse::stop());
        }

        if buffer.data.len() as u64 != request.current_position
            || buffer.total as u64 != request.total_bytes
            || request.bytes_sent != request.payload.len() as u64
            || buffer.data.len() + request.payload.len() > buffer.total
        {
            return Err(invalid("the multi-part chunk does not continue the transfer"));
        }
        buffer.data.extend_from_slice(&request.payload);

        if request.status == MessageStatus::Complete {
            if buffer.data.len() != buffer.total {
                return Err(invalid("the multi-part message is incomplete"));
            }
            log::debug!("multi-part {transaction_id}: complete, dispatching {}", request.method);
            let response = self.next.call_method(&request.method, &buffer.data)?;
            return Ok(MultiPartResponse::completed(response));
        }

        session.add(key, buffer)?;
        Ok(MultiPartResponse::proceed())
    }
}

impl Dispatch for MultiPartServer {
    fn call_method(&self, method: &str, request: &[u8]) -> Result<Vec<u8>, Fault> {
        if method != METHOD_MULTI {
            return self.next.call_method(method, request);
        }
        let request: MultiPartRequest = decode_request(method, request)?;
        let response = self.receive(request)?;
        encode_response(method, &response)
    }
}
