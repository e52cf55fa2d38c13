//! Decode offloading
//!
//! Decoding a chunk or model is CPU work that should not run on the task
//! driving the render loop. [`ThreadOffload`] binds each decode function to a
//! dedicated worker thread on first use; [`InlineOffload`] runs it in place
//! for platforms without spare cores.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;
use std::sync::{Mutex, PoisonError};
use std::thread;

use futures::channel::oneshot;

use crate::core::config::OffloadMode;
use crate::core::error::Error;
use crate::core::types::Result;

/// A pure decode function. Plain `fn` pointers only, so nothing captured
/// has to cross the thread boundary.
pub type DecodeFn<I, O> = fn(I) -> Result<O>;

type Job<I, O> = (I, oneshot::Sender<Result<O>>);
type WorkerSender<I, O> = mpsc::Sender<Job<I, O>>;
type BindingKey = (usize, TypeId, TypeId);

/// Something that can move a decode function off the calling task
pub trait Offload {
    fn offload<I, O>(&self, decode: DecodeFn<I, O>) -> Offloaded<I, O>
    where
        I: Send + 'static,
        O: Send + 'static;
}

/// A decode function bound to its execution backend
pub struct Offloaded<I, O> {
    decode: DecodeFn<I, O>,
    worker: Option<WorkerSender<I, O>>,
}

impl<I, O> Clone for Offloaded<I, O> {
    fn clone(&self) -> Self {
        Self {
            decode: self.decode,
            worker: self.worker.clone(),
        }
    }
}

impl<I: Send + 'static, O: Send + 'static> Offloaded<I, O> {
    /// Bind to the calling task
    pub fn inline(decode: DecodeFn<I, O>) -> Self {
        Self { decode, worker: None }
    }

    pub fn is_threaded(&self) -> bool {
        self.worker.is_some()
    }

    /// Run the decode function on its backend
    pub async fn call(&self, input: I) -> Result<O> {
        let Some(worker) = &self.worker else {
            return run_guarded(self.decode, input);
        };

        let (reply, result) = oneshot::channel();
        if let Err(mpsc::SendError((input, _))) = worker.send((input, reply)) {
            log::warn!("decode worker for {} is gone, decoding inline", type_name::<O>());
            return run_guarded(self.decode, input);
        }

        result
            .await
            .map_err(|_| Error::Worker(format!("decode worker for {} dropped a request", type_name::<O>())))?
    }
}

/// Call `decode`, turning a panic into an error
fn run_guarded<I, O>(decode: DecodeFn<I, O>, input: I) -> Result<O> {
    catch_unwind(AssertUnwindSafe(|| decode(input))).unwrap_or_else(|panic| {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(Error::Worker(format!("{} decode panicked: {message}", type_name::<O>())))
    })
}

fn spawn_worker<I, O>(decode: DecodeFn<I, O>, name: String) -> std::io::Result<WorkerSender<I, O>>
where
    I: Send + 'static,
    O: Send + 'static,
{
    let (sender, jobs) = mpsc::channel::<Job<I, O>>();
    thread::Builder::new().name(name).spawn(move || {
        for (input, reply) in jobs {
            reply.send(run_guarded(decode, input)).ok();
        }
    })?;
    Ok(sender)
}

/// Runs every decode on the calling task
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineOffload;

impl Offload for InlineOffload {
    fn offload<I, O>(&self, decode: DecodeFn<I, O>) -> Offloaded<I, O>
    where
        I: Send + 'static,
        O: Send + 'static,
    {
        Offloaded::inline(decode)
    }
}

/// One worker thread per decode function, created on first use
///
/// Workers live as long as this value or any [`Offloaded`] handle bound to
/// them.
#[derive(Default)]
pub struct ThreadOffload {
    workers: Mutex<HashMap<BindingKey, Box<dyn Any + Send>>>,
}

impl ThreadOffload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of worker threads started so far
    pub fn worker_count(&self) -> usize {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Offload for ThreadOffload {
    fn offload<I, O>(&self, decode: DecodeFn<I, O>) -> Offloaded<I, O>
    where
        I: Send + 'static,
        O: Send + 'static,
    {
        let key = (decode as usize, TypeId::of::<I>(), TypeId::of::<O>());
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(sender) = workers
            .get(&key)
            .and_then(|bound| bound.downcast_ref::<WorkerSender<I, O>>())
        {
            return Offloaded {
                decode,
                worker: Some(sender.clone()),
            };
        }

        let name = format!("voxstream-decode-{}", workers.len());
        match spawn_worker(decode, name.clone()) {
            Ok(sender) => {
                log::debug!("started {name} for {}", type_name::<O>());
                workers.insert(key, Box::new(sender.clone()));
                Offloaded {
                    decode,
                    worker: Some(sender),
                }
            }
            Err(e) => {
                log::warn!("could not start decode worker for {}: {e}, decoding inline", type_name::<O>());
                Offloaded::inline(decode)
            }
        }
    }
}

/// Backend chosen at startup
pub enum Offloader {
    Thread(ThreadOffload),
    Inline(InlineOffload),
}

impl Offloader {
    /// Pick a backend; `Auto` uses threads when more than one core is available
    pub fn from_mode(mode: OffloadMode) -> Self {
        let threaded = match mode {
            OffloadMode::Thread => true,
            OffloadMode::Inline => false,
            OffloadMode::Auto => thread::available_parallelism().is_ok_and(|n| n.get() > 1),
        };

        if threaded {
            Offloader::Thread(ThreadOffload::new())
        } else {
            log::info!("decoding inline ({mode:?})");
            Offloader::Inline(InlineOffload)
        }
    }

    pub fn is_threaded(&self) -> bool {
        matches!(self, Offloader::Thread(_))
    }

    pub fn worker_count(&self) -> usize {
        match self {
            Offloader::Thread(pool) => pool.worker_count(),
            Offloader::Inline(_) => 0,
        }
    }
}

impl Offload for Offloader {
    fn offload<I, O>(&self, decode: DecodeFn<I, O>) -> Offloaded<I, O>
    where
        I: Send + 'static,
        O: Send + 'static,
    {
        match self {
            Offloader::Thread(pool) => pool.offload(decode),
            Offloader::Inline(inline) => inline.offload(decode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_sum(bytes: Vec<u8>) -> Result<u32> {
        Ok(bytes.iter().map(|&b| u32::from(b)).sum())
    }

    fn reject(_: Vec<u8>) -> Result<u32> {
        Err(Error::decode("test", "unsupported payload"))
    }

    fn explode(bytes: Vec<u8>) -> Result<u32> {
        if bytes.is_empty() {
            panic!("empty payload");
        }
        Ok(bytes.len() as u32)
    }

    #[tokio::test]
    async fn test_inline_matches_direct_call() {
        let decode = InlineOffload.offload(byte_sum);
        assert!(!decode.is_threaded());

        let input = vec![1, 2, 3, 250];
        assert_eq!(decode.call(input.clone()).await.unwrap(), byte_sum(input).unwrap());
    }

    #[tokio::test]
    async fn test_thread_result_matches_direct_call() {
        let pool = ThreadOffload::new();
        let decode = pool.offload(byte_sum);
        assert!(decode.is_threaded());
        assert_eq!(decode.call(vec![10, 20]).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn test_one_worker_per_function() {
        let pool = ThreadOffload::new();
        let a = pool.offload(byte_sum);
        let b = pool.offload(byte_sum);
        assert_eq!(pool.worker_count(), 1);

        pool.offload(reject);
        assert_eq!(pool.worker_count(), 2);

        assert_eq!(a.call(vec![1]).await.unwrap(), 1);
        assert_eq!(b.call(vec![2]).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_decode_error_propagates() {
        let pool = ThreadOffload::new();
        let err = pool.offload(reject).call(vec![]).await.unwrap_err();
        assert!(matches!(err, Error::Decode { asset: "test", .. }));
    }

    #[tokio::test]
    async fn test_panic_becomes_error_and_worker_survives() {
        let pool = ThreadOffload::new();
        let decode = pool.offload(explode);

        let err = decode.call(vec![]).await.unwrap_err();
        assert!(matches!(err, Error::Worker(ref msg) if msg.contains("empty payload")));

        assert_eq!(decode.call(vec![1, 2]).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_inline_panic_becomes_error() {
        let err = InlineOffload.offload(explode).call(vec![]).await.unwrap_err();
        assert!(matches!(err, Error::Worker(_)));
    }

    #[test]
    fn test_mode_selection() {
        assert!(Offloader::from_mode(OffloadMode::Thread).is_threaded());
        assert!(!Offloader::from_mode(OffloadMode::Inline).is_threaded());
        assert_eq!(Offloader::from_mode(OffloadMode::Inline).worker_count(), 0);
    }
}
