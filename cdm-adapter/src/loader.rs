use crate::error::Error;
use cdm_api::{ApiRevision, EngineHost, EngineInstance, EngineModule};
use libloading::Library;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Symbol a native engine module must export. See [`CreateEngineFn`].
pub const CREATE_ENGINE_SYMBOL: &[u8] = b"create_cdm_engine\0";

/// Entry point resolved from a native engine module.
///
/// Called once per candidate revision during negotiation. `host` points to
/// a heap-allocated `Arc<dyn EngineHost>`; a module that accepts the
/// revision takes ownership of it and returns a heap-allocated
/// `Box<dyn EngineInstance>`. A module that rejects the revision must leave
/// `host` untouched and return null, in which case the loader reclaims the
/// allocation.
///
/// Both sides of this boundary are Rust compiled against the same `cdm-api`
/// version; the pointers are opaque tokens to the C ABI in between.
pub type CreateEngineFn = unsafe extern "C" fn(
    revision: u32,
    key_system: *const u8,
    key_system_len: usize,
    host: *mut Arc<dyn EngineHost>,
) -> *mut Box<dyn EngineInstance>;

/// The negotiated engine: one instance, the revision it speaks, and the
/// module it came from. The module stays loaded for as long as the
/// instance may be called into.
pub(crate) struct EngineHandle {
    pub instance: Box<dyn EngineInstance>,
    pub revision: ApiRevision,
    _module: Arc<dyn EngineModule>,
}

/// Offers each supported revision to the module, newest first, and keeps
/// the first one it accepts. There is no fall-back re-negotiation later:
/// the highest accepted revision is used exclusively.
pub(crate) fn negotiate(
    module: Arc<dyn EngineModule>,
    key_system: &str,
    host: Arc<dyn EngineHost>,
) -> Result<EngineHandle, Error> {
    for revision in ApiRevision::NEGOTIATION_ORDER {
        if let Some(instance) = module.instantiate(revision, key_system, Arc::clone(&host)) {
            log::debug!("negotiated engine interface revision {revision}");
            return Ok(EngineHandle {
                instance,
                revision,
                _module: module,
            });
        }
    }
    Err(Error::UnsupportedVersion)
}

/// An engine module loaded from a shared library on disk.
pub struct NativeEngineModule {
    library: Library,
    path: PathBuf,
}

impl NativeEngineModule {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let load_error = |reason: String| Error::EngineLoad {
            path: path.to_path_buf(),
            reason,
        };

        // Safety: loading runs the module's initializers; the module path
        // comes from the embedder's configuration and is trusted to the
        // same degree as the engine itself.
        let library = unsafe { Library::new(path) }.map_err(|err| load_error(err.to_string()))?;

        // Resolve the entry point once up front so a module without it
        // fails construction instead of failing negotiation later.
        unsafe { library.get::<CreateEngineFn>(CREATE_ENGINE_SYMBOL) }
            .map_err(|err| load_error(err.to_string()))?;

        log::debug!("loaded engine module {}", path.display());
        Ok(Self {
            library,
            path: path.to_path_buf(),
        })
    }
}

impl EngineModule for NativeEngineModule {
    fn instantiate(
        &self,
        revision: ApiRevision,
        key_system: &str,
        host: Arc<dyn EngineHost>,
    ) -> Option<Box<dyn EngineInstance>> {
        let create = unsafe { self.library.get::<CreateEngineFn>(CREATE_ENGINE_SYMBOL) }.ok()?;

        let host = Box::into_raw(Box::new(host));
        // Safety: the contract documented on CreateEngineFn. On success
        // the module owns `host`, on rejection it is reclaimed here.
        let raw = unsafe { create(revision.tag(), key_system.as_ptr(), key_system.len(), host) };
        if raw.is_null() {
            drop(unsafe { Box::from_raw(host) });
            log::trace!(
                "engine module {} rejected revision {revision}",
                self.path.display()
            );
            None
        } else {
            Some(*unsafe { Box::from_raw(raw) })
        }
    }
}
