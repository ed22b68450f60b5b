// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Launch Docker Compose services out of a keyed directory tree.
//!
//! Services are organized in a four level directory tree rooted at a server
//! directory:
//!
//! ```text
//! <root>/
//! ├── 000000-SRV.env
//! └── 0000000-acme/                    organization
//!     ├── 000000-acme.env
//!     └── 001000-shop/                 application
//!         ├── 01000-shop.env
//!         └── 01310-web/               service
//!             ├── 0310-web.env
//!             └── 0310-docker-compose.yml
//! ```
//!
//! A five character __service key__ like `01310` addresses a service. Every
//! directory and file name along the way is derived from that key, so the
//! tree can be walked without any index or registry.
//!
//! Launching a service happens in four steps:
//!
//! 1. Decode service key ([`key`]).
//! 2. Resolve service tree ([`tree`]).
//! 3. Compose environment out of the environment files along the tree
//!    ([`env`]).
//! 4. Invoke `docker compose` with that environment ([`compose`]).
//!
//! Fatal errors are recorded in a persistent [`journal`].

pub mod compose;
pub mod config;
pub mod env;
pub mod fs;
pub mod journal;
pub mod key;
pub mod path;
pub mod tree;

pub use compose::{ComposeError, ComposeInvoker, ComposeVariant, Launch};
pub use config::Settings;
pub use env::{EnvError, EnvLoader, EnvironmentMap, LoadedEnvironment};
pub use journal::{ErrorJournal, JournalEntry};
pub use key::{KeyError, ServiceKey};
pub use tree::ServiceTree;
