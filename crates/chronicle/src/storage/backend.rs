//! Per-backend query shaping
//!
//! Each backend has a fixed profile; the pipeline asks the profile for a
//! [`QueryParams`] bag instead of branching on the backend itself.

use serde::{Deserialize, Serialize};

/// Supported store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BackendKind {
    #[default]
    #[serde(rename = "lancedb")]
    LanceDb,
    #[serde(rename = "memory")]
    Memory,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::LanceDb => "lancedb",
            BackendKind::Memory => "memory",
        }
    }

    pub fn profile(self) -> BackendProfile {
        match self {
            BackendKind::LanceDb => BackendProfile {
                kind: self,
                native_hybrid: false,
                overfetch: 4,
                hybrid_overfetch: None,
            },
            BackendKind::Memory => BackendProfile {
                kind: self,
                native_hybrid: true,
                overfetch: 4,
                hybrid_overfetch: Some(2),
            },
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static capabilities of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendProfile {
    pub kind: BackendKind,
    /// Backend fuses vector and lexical scores itself
    pub native_hybrid: bool,
    /// Candidate multiplier for plain vector queries
    pub overfetch: usize,
    /// Candidate multiplier when the native hybrid query is used
    pub hybrid_overfetch: Option<usize>,
}

/// Normalized parameters for one store query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryParams {
    pub top_k: usize,
    pub threshold: f32,
    /// Use the backend's native hybrid query
    pub hybrid: bool,
    pub overfetch: usize,
}

impl BackendProfile {
    /// Shape a query for `insert_count` final results.
    ///
    /// `want_hybrid` is honored only when the backend supports it natively;
    /// `overfetch_override` replaces the profile multiplier.
    pub fn query_params(
        &self,
        insert_count: usize,
        threshold: f32,
        want_hybrid: bool,
        overfetch_override: Option<usize>,
    ) -> QueryParams {
        let hybrid = want_hybrid && self.native_hybrid;
        let profile_overfetch = if hybrid {
            self.hybrid_overfetch.unwrap_or(self.overfetch)
        } else {
            self.overfetch
        };
        let overfetch = overfetch_override.unwrap_or(profile_overfetch).max(1);

        QueryParams {
            top_k: insert_count.saturating_mul(overfetch),
            threshold,
            hybrid,
            overfetch,
        }
    }
}
