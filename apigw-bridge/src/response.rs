use crate::header::{append_header, HeaderValues, HeaderValuesMap};

use log::warn;
use tokio::sync::watch;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Status code reported when the handler never sets one.
pub const DEFAULT_STATUS_CODE: u16 = 200;

/// In-memory stand-in for a server response object.
///
/// A `SyntheticResponse` collects the header mutations, status code and final payload written by a
/// server-style handler, without any network socket behind it. The response starts out open and
/// becomes ended the first time [`end`](SyntheticResponse::end) is called. Any number of tasks may
/// wait for that transition via [`ended`](SyntheticResponse::ended).
///
/// Cloning the response is cheap and yields another handle to the same underlying response, so
/// the handler and the caller awaiting completion can each hold one.
///
/// Setting headers or the status code after the response has ended is a contract violation on the
/// handler's part: the mutation is ignored (and logged). A repeated [`end`](SyntheticResponse::end)
/// replaces the payload but does not signal completion again.
#[derive(Clone, Debug)]
pub struct SyntheticResponse {
  inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
  state: Mutex<ResponseState>,
  ended_tx: watch::Sender<bool>,
}

#[derive(Debug, Default)]
pub(crate) struct ResponseState {
  pub(crate) headers: HeaderValuesMap,
  pub(crate) status_code: Option<u16>,
  pub(crate) payload: Option<Vec<u8>>,
  pub(crate) ended: bool,
}

impl SyntheticResponse {
  /// Create an open response with no headers, no payload and the default status code.
  pub fn new() -> Self {
    let (ended_tx, _) = watch::channel(false);
    Self {
      inner: Arc::new(Inner {
        state: Mutex::new(ResponseState::default()),
        ended_tx,
      }),
    }
  }

  /// Set a response header.
  ///
  /// The first call for a given `name` stores a single value. A second call for the same `name`
  /// turns the stored value into an ordered sequence of both values, and each later call appends
  /// to it. Header names are compared exactly (i.e., case-sensitively).
  pub fn set_header<N, V>(&self, name: N, value: V)
  where
    N: Into<String>,
    V: Into<String>,
  {
    let name = name.into();
    let mut state = self.lock();
    if state.ended {
      warn!("Ignoring header `{name}` set after the response ended");
      return;
    }
    append_header(&mut state.headers, name, value.into());
  }

  /// Return the value(s) currently stored for header `name`.
  pub fn get_header(&self, name: &str) -> Option<HeaderValues> {
    self.lock().headers.get(name).cloned()
  }

  /// Return a copy of every header set so far, in insertion order.
  pub fn headers(&self) -> HeaderValuesMap {
    self.lock().headers.clone()
  }

  /// Set the HTTP status code.
  pub fn set_status_code(&self, status_code: u16) {
    let mut state = self.lock();
    if state.ended {
      warn!("Ignoring status code {status_code} set after the response ended");
      return;
    }
    state.status_code = Some(status_code);
  }

  /// HTTP status code, or [`DEFAULT_STATUS_CODE`] if none was set.
  pub fn status_code(&self) -> u16 {
    self.lock().status_code.unwrap_or(DEFAULT_STATUS_CODE)
  }

  /// Final payload passed to [`end`](SyntheticResponse::end), if the response has ended.
  pub fn payload(&self) -> Option<Vec<u8>> {
    self.lock().payload.clone()
  }

  /// Finish the response with the given payload and wake every task waiting in
  /// [`ended`](SyntheticResponse::ended).
  ///
  /// The first call ends the response. A later call replaces the stored payload (logging a
  /// warning) but does not signal completion again, so anyone serializing the response after the
  /// first call may observe either payload.
  pub fn end<P>(&self, payload: P)
  where
    P: Into<Vec<u8>>,
  {
    {
      let mut state = self.lock();
      state.payload = Some(payload.into());
      if state.ended {
        warn!("Replacing payload of a response that already ended");
        return;
      }
      state.ended = true;
    }

    log::trace!("Response ended");
    // `send_replace` succeeds even if nobody is currently waiting.
    self.inner.ended_tx.send_replace(true);
  }

  /// Whether [`end`](SyntheticResponse::end) has been called.
  pub fn is_ended(&self) -> bool {
    self.lock().ended
  }

  /// Wait until the response has ended.
  ///
  /// Returns immediately if [`end`](SyntheticResponse::end) was already called. There is no
  /// timeout: if the handler never ends the response, this future never resolves.
  pub async fn ended(&self) {
    let mut ended_rx = self.inner.ended_tx.subscribe();
    // The sender is owned by `self`, so the channel can't close while we're waiting.
    let _ = ended_rx.wait_for(|ended| *ended).await;
  }

  pub(crate) fn with_state<R>(&self, f: impl FnOnce(&ResponseState) -> R) -> R {
    f(&self.lock())
  }

  fn lock(&self) -> MutexGuard<'_, ResponseState> {
    // No code path panics while holding the lock, but recover the state regardless.
    self
      .inner
      .state
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }
}

impl Default for SyntheticResponse {
  fn default() -> Self {
    Self::new()
  }
}
