use dashmap::DashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use crate::compute::{EngineHandle, SpawnEngine, VolumeDescriptor, read_prefixed};
use crate::error::ComputeError;

/// Runs the comparison engine as a child process.
///
/// Both descriptors are written to the child's stdin back to back; the
/// child answers on stdout with a single length-prefixed result buffer.
/// Results stay in the engine's table until their handle is released.
#[derive(Debug)]
pub struct SubprocessEngine {
    program: PathBuf,
    args: Vec<String>,
    results: DashMap<u64, Vec<u8>>,
    next_handle: AtomicU64,
}

impl SubprocessEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            results: DashMap::new(),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Results generated but not yet released.
    pub fn outstanding(&self) -> usize {
        self.results.len()
    }
}

impl SpawnEngine for SubprocessEngine {
    fn generate(&self, pre: &VolumeDescriptor, post: &VolumeDescriptor) -> Result<EngineHandle, ComputeError> {
        let mut payload = pre.encode()?;
        payload.extend(post.encode()?);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Feed stdin from another thread so a chatty child cannot deadlock on a full stdout pipe.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ComputeError::Engine("child stdin unavailable".to_string()))?;
        let writer = std::thread::spawn(move || stdin.write_all(&payload));

        let output = child.wait_with_output()?;
        match writer.join() {
            Ok(Ok(())) => {}
            // The child may legitimately exit before reading everything; its status decides.
            Ok(Err(e)) => debug!(error = %e, "engine closed stdin early"),
            Err(_) => return Err(ComputeError::Aborted("stdin writer panicked".to_string())),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ComputeError::Engine(format!("{} exited with {}: {}", self.program.display(), output.status, stderr.trim())));
        }

        let (body, used) = read_prefixed(&output.stdout)?;
        if used != output.stdout.len() {
            return Err(ComputeError::InvalidOutput(format!(
                "{} trailing bytes after result buffer",
                output.stdout.len() - used
            )));
        }

        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.results.insert(id, body.to_vec());
        Ok(EngineHandle::new(id))
    }

    fn read_result(&self, handle: &EngineHandle) -> Result<Vec<u8>, ComputeError> {
        self.results
            .get(&handle.id())
            .map(|r| r.value().clone())
            .ok_or(ComputeError::UnknownHandle(handle.id()))
    }

    fn release(&self, handle: EngineHandle) {
        self.results.remove(&handle.id());
    }
}
