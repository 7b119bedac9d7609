use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{Result, ViewError};
use crate::geometry::mesh::{Aabb, TriangleMesh};
use crate::runtime::Liveness;

/// Locator of externally authored anatomy geometry: a path or a `file://` URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MeshReference(String);

impl MeshReference {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn resolve(&self) -> Result<PathBuf> {
        let locator = self.0.trim();
        if locator.starts_with("http://") || locator.starts_with("https://") {
            return Err(self.failure("remote references are not fetched"));
        }
        if locator.is_empty() {
            return Err(self.failure("empty reference"));
        }
        Ok(PathBuf::from(locator.strip_prefix("file://").unwrap_or(locator)))
    }

    fn failure(&self, reason: impl Into<String>) -> ViewError {
        ViewError::MeshLoadFailure {
            reference: self.0.clone(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MeshPart {
    pub name: String,
    pub mesh: TriangleMesh,
}

/// A loaded group of drawables. Authored materials are not carried over.
#[derive(Debug, Clone)]
pub struct LoadedMesh {
    pub parts: Vec<MeshPart>,
}

impl LoadedMesh {
    pub fn bounds(&self) -> Option<Aabb> {
        self.parts
            .iter()
            .filter_map(|p| p.mesh.bounds())
            .reduce(Aabb::union)
    }
}

pub fn load_obj(reference: &MeshReference) -> Result<LoadedMesh> {
    let path = reference.resolve()?;
    read_obj(&path).map_err(|reason| reference.failure(reason))
}

fn read_obj(path: &Path) -> std::result::Result<LoadedMesh, String> {
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            single_index: true,
            triangulate: true,
            ..Default::default()
        },
    )
    .map_err(|e| e.to_string())?;

    let parts: Vec<MeshPart> = models
        .into_iter()
        .filter(|m| !m.mesh.indices.is_empty())
        .map(|model| {
            let mut mesh = TriangleMesh {
                vertices: model.mesh.positions,
                normals: model.mesh.normals,
                indices: model.mesh.indices,
            };
            if mesh.normals.len() != mesh.vertices.len() {
                log::debug!("Computing normals for {}", model.name);
                mesh.compute_normals();
            }
            MeshPart {
                name: model.name,
                mesh,
            }
        })
        .collect();

    if parts.is_empty() {
        return Err("no triangles found".to_string());
    }

    log::info!("Loaded {} mesh part(s) from {}", parts.len(), path.display());
    Ok(LoadedMesh { parts })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadTicket(u64);

pub enum LoadCommand {
    Load {
        ticket: LoadTicket,
        reference: MeshReference,
        liveness: Liveness,
    },
    Stop,
}

pub struct MeshLoadResult {
    pub ticket: LoadTicket,
    pub liveness: Liveness,
    pub outcome: Result<LoadedMesh>,
}

/// Parses meshes off the host thread. Results are polled by the host.
pub struct MeshLoader {
    tx_cmd: Sender<LoadCommand>,
    rx_result: Receiver<MeshLoadResult>,
    last_error: Arc<Mutex<Option<String>>>,
    next_ticket: u64,
    stopped: bool,
    thread_handle: Option<JoinHandle<()>>,
}

impl MeshLoader {
    pub fn new() -> Self {
        let (tx_cmd, rx_cmd) = channel::unbounded::<LoadCommand>();
        let (tx_result, rx_result) = channel::unbounded::<MeshLoadResult>();
        let last_error = Arc::new(Mutex::new(None));
        let last_error_clone = Arc::clone(&last_error);

        let thread_handle = thread::Builder::new()
            .name("mesh-loader".into())
            .spawn(move || loader_thread(rx_cmd, tx_result, last_error_clone))
            .ok();

        if thread_handle.is_none() {
            log::error!("Failed to spawn mesh loader thread");
        }

        Self {
            tx_cmd,
            rx_result,
            last_error,
            next_ticket: 0,
            stopped: false,
            thread_handle,
        }
    }

    /// Queues a load. Fails once the loader is stopped or its worker is gone,
    /// since no result would ever arrive.
    pub fn load(&mut self, reference: MeshReference, liveness: Liveness) -> Result<LoadTicket> {
        let not_running = ViewError::MeshLoadFailure {
            reference: reference.as_str().to_string(),
            reason: "mesh loader is not running".to_string(),
        };
        if !self.is_running() {
            return Err(not_running);
        }

        self.next_ticket += 1;
        let ticket = LoadTicket(self.next_ticket);
        log::debug!("Queueing mesh load {:?} for {}", ticket, reference.as_str());
        self.tx_cmd
            .send(LoadCommand::Load {
                ticket,
                reference,
                liveness,
            })
            .map_err(|_| not_running)?;
        Ok(ticket)
    }

    pub fn try_recv_result(&self) -> Option<MeshLoadResult> {
        self.rx_result.try_recv().ok()
    }

    pub fn recv_result_timeout(&self, timeout: std::time::Duration) -> Option<MeshLoadResult> {
        self.rx_result.recv_timeout(timeout).ok()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn stop(&mut self) {
        self.stopped = true;
        let _ = self.tx_cmd.send(LoadCommand::Stop);
    }

    pub fn is_running(&self) -> bool {
        !self.stopped && self.thread_handle.is_some()
    }
}

impl Default for MeshLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MeshLoader {
    fn drop(&mut self) {
        let _ = self.tx_cmd.send(LoadCommand::Stop);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

fn loader_thread(
    rx_cmd: Receiver<LoadCommand>,
    tx_result: Sender<MeshLoadResult>,
    last_error: Arc<Mutex<Option<String>>>,
) {
    loop {
        let cmd = match rx_cmd.recv() {
            Ok(c) => c,
            Err(_) => return,
        };

        match cmd {
            LoadCommand::Load {
                ticket,
                reference,
                liveness,
            } => {
                if !liveness.is_alive() {
                    log::debug!("Skipping mesh load {:?}, owner already unmounted", ticket);
                    continue;
                }

                let outcome = load_obj(&reference);
                match &outcome {
                    Ok(_) => *last_error.lock() = None,
                    Err(e) => *last_error.lock() = Some(e.to_string()),
                }

                let _ = tx_result.send(MeshLoadResult {
                    ticket,
                    liveness,
                    outcome,
                });
            }
            LoadCommand::Stop => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_loader_refuses_new_work() {
        let mut loader = MeshLoader::new();
        assert!(loader.is_running());
        loader.stop();

        let err = loader
            .load(MeshReference::new("bone.obj"), Liveness::new())
            .unwrap_err();
        assert!(matches!(err, ViewError::MeshLoadFailure { ref reference, .. } if reference == "bone.obj"));
        assert!(!loader.is_running());
    }

    #[test]
    fn remote_references_are_rejected() {
        let reference = MeshReference::new("https://cdn.example.org/bone.obj");
        assert!(matches!(
            reference.resolve(),
            Err(ViewError::MeshLoadFailure { .. })
        ));
    }

    #[test]
    fn file_urls_resolve_to_paths() {
        let reference = MeshReference::new("file:///tmp/models/cortical.obj");
        assert_eq!(
            reference.resolve().unwrap(),
            PathBuf::from("/tmp/models/cortical.obj")
        );
        assert_eq!(
            MeshReference::new("models/nerve.obj").resolve().unwrap(),
            PathBuf::from("models/nerve.obj")
        );
    }

    #[test]
    fn missing_file_is_a_load_failure() {
        let reference = MeshReference::new("/definitely/not/here.obj");
        let err = load_obj(&reference).unwrap_err();
        assert!(matches!(err, ViewError::MeshLoadFailure { .. }));
    }
}
