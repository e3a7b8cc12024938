//! Stock authentication backends
//!
//! | Kind       | Type                  | Checks credentials against        |
//! |------------|-----------------------|-----------------------------------|
//! | `simple`   | [`CredentialTable`]   | a static `username -> secret` map |
//! | `upstream` | [`UpstreamProbe`]     | another HTTP endpoint             |
//! | `gitlabci` | [`TokenProbe`]        | a GitLab instance (CI job tokens) |
//! | `ldap`     | [`DirectoryClient`]   | an LDAP directory                 |

pub mod gitlabci;
pub mod ldap;
pub mod simple;
pub mod upstream;

pub use gitlabci::TokenProbe;
pub use ldap::DirectoryClient;
pub use simple::CredentialTable;
pub use upstream::{Forward, UpstreamProbe};
