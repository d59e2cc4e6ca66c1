//! Keel State Management
//!
//! Persists what Keel has created so that later runs can plan against it.
//!
//! - **StateFile**: every managed resource with its remote identifier and
//!   last observed attributes, guarded by a serial and a lineage
//! - **StateBackend**: where the state file lives (currently a local file)
//! - **LockInfo**: who holds the state while an operation runs
//!
//! ```ignore
//! let backend = create_backend(parsed.backend.as_ref())?;
//! let lock = backend.acquire_lock("apply").await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//! // ... apply ...
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendError, BackendResult, StateBackend};
pub use backends::{LocalBackend, create_backend};
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile};
