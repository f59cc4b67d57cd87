//! nifi-deploy Deployment Engine
//!
//! Reconciles a live NiFi flow tree with a template artifact. The engine
//! walks nested process groups, drains queues before destructive steps,
//! orders processor and controller service transitions so that
//! dependencies are always satisfied, and replaces a deployed template
//! instance with a new version.
//!
//! ## Components
//!
//! - [`TreeWalker`]: lazy pre-order traversal, re-reading each group
//! - [`QueueDrainer`]: drop requests polled under a [`DrainPolicy`]
//! - [`StatusOrchestrator`]: processor, port and service state changes
//! - [`ControllerResolver`]: service settings and `_requires_service` chains
//! - [`SensitiveInjector`]: write-only secrets for processors
//! - [`TemplateDeployer`]: the full replace-and-instantiate workflow
//!
//! All remote access goes through [`nifi_client::FlowApi`]; the engine keeps
//! no state between runs.
//!
//! ## Usage
//!
//! ```no_run
//! use nifi_client::NifiClient;
//! use nifi_deployment::{DeployOptions, PropertySections, TemplateDeployer};
//! use nifi_types::{GroupId, TemplateArtifact};
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = NifiClient::new("http://localhost:8080/nifi-api", Duration::from_secs(30))?;
//! let deployer = TemplateDeployer::new(Arc::new(client))
//!     .with_controller_sections(PropertySections::load_dir(Path::new("config/controller"))?)
//!     .with_sensitive_sections(PropertySections::load_optional_file(Path::new("config/sensitive.toml"))?);
//!
//! let artifact = TemplateArtifact::load(Path::new("webcrawler.xml"))?;
//! let report = deployer
//!     .deploy(&artifact, &GroupId::root(), &DeployOptions::default().with_start(true))
//!     .await?;
//! println!("deployed {} as {}", report.template_name, report.group_id);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod controllers;
pub mod drain;
pub mod error;
pub mod lookup;
pub mod sections;
pub mod sensitive;
pub mod status;
pub mod template;
pub mod walker;

// Re-exports
pub use controllers::{ControllerResolver, ResolveSummary, CONFIG_SECTION};
pub use drain::{DrainPolicy, DrainSummary, QueueDrainer};
pub use error::{ComponentKind, DeployError, Result};
pub use lookup::{find_group_by_name, find_processor_by_name, find_template_by_name, LookupOutcome};
pub use sections::{PropertySections, Section};
pub use sensitive::SensitiveInjector;
pub use status::{StatusOrchestrator, TargetState, TransitionSummary};
pub use template::{ConfigureSummary, DeployOptions, DeployReport, TemplateDeployer};
pub use walker::{GroupVisit, TreeWalker};
