//! Canonical patch encoding and the commit message trailer envelope.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::model::{self, Patch, MAX_SUPPORTED_SCHEMA};

/// Encodes a patch to its canonical CBOR bytes. Field order is fixed by
/// `Patch`'s declaration and every internal map (`VersionVector`) is
/// `BTreeMap`-backed, so two equal patches always encode to the same
/// bytes — the property the patch's content address depends on.
pub fn encode_patch(patch: &Patch) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(patch, &mut buf).map_err(|e| Error::Codec(e.to_string()))?;
    Ok(buf)
}

pub fn decode_patch(bytes: &[u8]) -> Result<Patch> {
    let patch: Patch = ciborium::from_reader(bytes).map_err(|e| Error::Codec(e.to_string()))?;
    if patch.ops.is_empty() {
        return Err(Error::EmptyPatch);
    }
    if patch.schema == 0 || patch.schema > MAX_SUPPORTED_SCHEMA {
        return Err(Error::SchemaUnsupported {
            found: patch.schema,
            max: MAX_SUPPORTED_SCHEMA,
        });
    }
    let required = patch.required_schema();
    if required > patch.schema {
        return Err(Error::SchemaUnsupported {
            found: required,
            max: patch.schema,
        });
    }
    Ok(patch)
}

/// `warp:patch` / `warp:audit` / `warp:checkpoint` commit message titles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitKind {
    Patch,
    Audit,
    Checkpoint,
}

impl CommitKind {
    fn title(self) -> &'static str {
        match self {
            CommitKind::Patch => "warp:patch",
            CommitKind::Audit => "warp:audit",
            CommitKind::Checkpoint => "warp:checkpoint",
        }
    }

    fn kind_trailer(self) -> &'static str {
        match self {
            CommitKind::Patch => "patch",
            CommitKind::Audit => "audit",
            CommitKind::Checkpoint => "checkpoint",
        }
    }
}

/// An ordered set of trailers plus the kind they describe. Trailer order is
/// canonical (alphabetical by key) when building a message, but `parse`
/// accepts any order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEnvelope {
    pub kind: CommitKind,
    pub trailers: BTreeMap<String, String>,
}

impl CommitEnvelope {
    pub fn patch(graph: &str, writer: &str, lamport: u64, patch_oid: &str, schema: u32) -> Result<Self> {
        if !model::is_valid_name(graph) {
            return Err(Error::InvalidName(graph.to_string()));
        }
        if !model::is_valid_name(writer) {
            return Err(Error::InvalidName(writer.to_string()));
        }
        let mut trailers = BTreeMap::new();
        trailers.insert("eg-kind".to_string(), "patch".to_string());
        trailers.insert("eg-graph".to_string(), graph.to_string());
        trailers.insert("eg-writer".to_string(), writer.to_string());
        trailers.insert("eg-lamport".to_string(), lamport.to_string());
        trailers.insert("eg-patch-oid".to_string(), patch_oid.to_string());
        trailers.insert("eg-schema".to_string(), schema.to_string());
        Ok(Self {
            kind: CommitKind::Patch,
            trailers,
        })
    }

    pub fn audit(graph: &str, writer: &str, data_commit: &str, ops_digest: &str, schema: u32) -> Result<Self> {
        if !model::is_valid_name(graph) {
            return Err(Error::InvalidName(graph.to_string()));
        }
        let mut trailers = BTreeMap::new();
        trailers.insert("eg-kind".to_string(), "audit".to_string());
        trailers.insert("eg-graph".to_string(), graph.to_string());
        trailers.insert("eg-writer".to_string(), writer.to_string());
        trailers.insert("eg-data-commit".to_string(), data_commit.to_string());
        trailers.insert("eg-ops-digest".to_string(), ops_digest.to_string());
        trailers.insert("eg-schema".to_string(), schema.to_string());
        Ok(Self {
            kind: CommitKind::Audit,
            trailers,
        })
    }

    /// `warp:checkpoint`: trailers identify the graph and the
    /// checkpoint's sequence number.
    pub fn checkpoint(graph: &str, seq: u64) -> Result<Self> {
        if !model::is_valid_name(graph) {
            return Err(Error::InvalidName(graph.to_string()));
        }
        let mut trailers = BTreeMap::new();
        trailers.insert("eg-kind".to_string(), "checkpoint".to_string());
        trailers.insert("eg-graph".to_string(), graph.to_string());
        trailers.insert("eg-seq".to_string(), seq.to_string());
        Ok(Self {
            kind: CommitKind::Checkpoint,
            trailers,
        })
    }

    /// Renders `<title>\n\n<trailer-key>: <value>\n...` with trailers in
    /// alphabetical order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(self.kind.title());
        out.push_str("\n\n");
        for (key, value) in &self.trailers {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    /// Strict decode: unknown trailers are tolerated, duplicates rejected,
    /// required trailers must be present, `eg-schema` must be a positive
    /// integer not exceeding `MAX_SUPPORTED_SCHEMA`.
    pub fn parse(message: &str) -> Result<Self> {
        let mut parts = message.splitn(2, "\n\n");
        let title = parts.next().unwrap_or_default().trim();
        let kind = match title {
            "warp:patch" => CommitKind::Patch,
            "warp:audit" => CommitKind::Audit,
            "warp:checkpoint" => CommitKind::Checkpoint,
            other => return Err(Error::Codec(format!("unknown commit title: {other}"))),
        };

        let mut trailers = BTreeMap::new();
        for line in parts.next().unwrap_or_default().lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                return Err(Error::Codec(format!("malformed trailer line: {line}")));
            };
            let key = key.trim().to_string();
            let value = value.trim().to_string();
            if trailers.insert(key.clone(), value).is_some() {
                return Err(Error::TrailerDuplicate(key));
            }
        }

        let required: &[&str] = match kind {
            CommitKind::Patch => &[
                "eg-kind",
                "eg-graph",
                "eg-writer",
                "eg-lamport",
                "eg-patch-oid",
                "eg-schema",
            ],
            CommitKind::Audit => &[
                "eg-kind",
                "eg-graph",
                "eg-writer",
                "eg-data-commit",
                "eg-ops-digest",
                "eg-schema",
            ],
            CommitKind::Checkpoint => &["eg-kind", "eg-graph", "eg-seq"],
        };
        for key in required {
            if !trailers.contains_key(*key) {
                return Err(Error::TrailerMissing(key));
            }
        }
        if trailers.get("eg-kind").map(String::as_str) != Some(kind.kind_trailer()) {
            return Err(Error::Codec("eg-kind does not match commit title".into()));
        }

        if matches!(kind, CommitKind::Patch | CommitKind::Audit) {
            let schema: u32 = trailers
                .get("eg-schema")
                .and_then(|s| s.parse().ok())
                .filter(|s| *s > 0)
                .ok_or_else(|| Error::Codec("eg-schema must be a positive integer".into()))?;
            if schema > MAX_SUPPORTED_SCHEMA {
                return Err(Error::SchemaUnsupported {
                    found: schema,
                    max: MAX_SUPPORTED_SCHEMA,
                });
            }
        } else if let Some(seq) = trailers.get("eg-seq") {
            seq.parse::<u64>()
                .map_err(|_| Error::Codec("eg-seq must be a non-negative integer".into()))?;
        }

        Ok(Self { kind, trailers })
    }

    pub fn trailer(&self, key: &str) -> Option<&str> {
        self.trailers.get(key).map(String::as_str)
    }
}
