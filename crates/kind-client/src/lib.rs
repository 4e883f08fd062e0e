//! kind Cluster Discovery Client
//!
//! Thin async wrappers around the `kind` and `docker` command-line tools,
//! used by the fleet controller to discover clusters, obtain their
//! kubeconfigs, and clean up labelled containers at shutdown.
//!
//! # Example
//!
//! ```no_run
//! use kind_client::{KindClient, KubeconfigEndpoint};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let kind = KindClient::new("kind");
//!
//! for cluster in kind.list_clusters().await? {
//!     let kubeconfig = kind.get_kubeconfig(&cluster, KubeconfigEndpoint::External).await?;
//!     println!("{cluster}: {} bytes of kubeconfig", kubeconfig.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod common;
pub mod docker;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod kind_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KindClient;
pub use docker::DockerClient;
pub use error::KindError;
pub use kind_trait::{DockerClientTrait, KindClientTrait};
pub use models::{FLEET_LABEL_KEY, KubeconfigEndpoint};
#[cfg(feature = "test-util")]
pub use mock::MockKindClient;
