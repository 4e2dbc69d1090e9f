//! Writer session: a fluent patch builder plus the commit flow
//! that turns a built patch into a CAS-protected ref update.

use crate::codec::CommitEnvelope;
use crate::error::{Error, Result};
use crate::model::{
    CborValue, EdgeKey, MAX_SUPPORTED_SCHEMA, NodeId, Op, Patch, PropTarget, ValueRef, WriterId,
};
use crate::port::PersistencePort;
use crate::vv::VersionVector;

/// Accumulates ops for a single atomic patch before it is sealed and
/// committed. One `WriterSession` serializes one writer's concurrent
/// attempts by holding the writer's own lamport counter and ref name.
pub struct WriterSession<'p> {
    port: &'p dyn PersistencePort,
    graph: String,
    writer: WriterId,
    ref_name: String,
    expected_tip: Option<String>,
    lamport: u64,
    counter: u64,
    context: VersionVector,
    ops: Vec<Op>,
    reads: Vec<String>,
    writes: Vec<String>,
}

impl<'p> WriterSession<'p> {
    /// Opens a session against `refs/warp/<graph>/writers/<writer>`, reading
    /// the writer's current tip (if any) to seed the CAS expectation and
    /// this writer's own last-emitted lamport value. `frontier` is the
    /// caller's current observed version vector (typically
    /// `State::observed_frontier` from a prior materialize); it seeds both
    /// the dot counter (`maxSeq(writerId)`, so the first minted dot after a
    /// null ref is `1`) and the patch's `context`.
    pub fn open(
        port: &'p dyn PersistencePort,
        graph: impl Into<String>,
        writer: impl Into<WriterId>,
        frontier: &VersionVector,
    ) -> Result<Self> {
        let graph = graph.into();
        let writer = writer.into();
        if !crate::model::is_valid_name(&graph) || !crate::model::is_valid_name(&writer) {
            return Err(Error::InvalidName(format!("{graph}/{writer}")));
        }
        let ref_name = format!("refs/warp/{graph}/writers/{writer}");
        let expected_tip = port.read_ref(&ref_name)?;
        let lamport = match &expected_tip {
            Some(tip) => {
                let message = port.show_commit(tip)?;
                let envelope = crate::codec::CommitEnvelope::parse(&message)?;
                envelope
                    .trailer("eg-lamport")
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(0)
            }
            None => 0,
        };
        Ok(Self {
            port,
            graph,
            writer: writer.clone(),
            ref_name,
            expected_tip,
            lamport,
            counter: frontier.get(&writer),
            context: frontier.clone(),
            ops: Vec::new(),
            reads: Vec::new(),
            writes: Vec::new(),
        })
    }

    fn next_seq(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    pub fn add_node(&mut self, node: impl Into<NodeId>) -> &mut Self {
        let seq = self.next_seq();
        self.ops.push(Op::NodeAdd {
            node: node.into(),
            seq,
        });
        self
    }

    pub fn remove_node(&mut self, node: impl Into<NodeId>, observed: Vec<crate::model::DotRef>) -> &mut Self {
        self.ops.push(Op::NodeTombstone {
            node: node.into(),
            observed,
        });
        self
    }

    pub fn add_edge(&mut self, edge: EdgeKey) -> &mut Self {
        let seq = self.next_seq();
        self.ops.push(Op::EdgeAdd { edge, seq });
        self
    }

    pub fn remove_edge(&mut self, edge: EdgeKey, observed: Vec<crate::model::DotRef>) -> &mut Self {
        self.ops.push(Op::EdgeTombstone { edge, observed });
        self
    }

    pub fn set_property(&mut self, node: impl Into<NodeId>, key: impl Into<String>, value: CborValue) -> &mut Self {
        self.ops.push(Op::PropSet {
            target: PropTarget::Node(node.into()),
            key: key.into(),
            value: ValueRef::Inline(value),
        });
        self
    }

    pub fn set_edge_property(&mut self, edge: EdgeKey, key: impl Into<String>, value: CborValue) -> &mut Self {
        self.ops.push(Op::PropSet {
            target: PropTarget::Edge(edge),
            key: key.into(),
            value: ValueRef::Inline(value),
        });
        self
    }

    pub fn track_read(&mut self, entity: impl Into<String>) -> &mut Self {
        self.reads.push(entity.into());
        self
    }

    pub fn track_write(&mut self, entity: impl Into<String>) -> &mut Self {
        self.writes.push(entity.into());
        self
    }

    /// Overrides the context seeded at `open` — rarely needed, since `open`
    /// already captures the caller's observed frontier as the default.
    pub fn with_context(&mut self, context: VersionVector) -> &mut Self {
        self.context = context;
        self
    }

    fn seal(&mut self) -> Result<Patch> {
        if self.ops.is_empty() {
            return Err(Error::EmptyPatch);
        }
        // newLamport = max(localLamport, vvMax(context)) + 1.
        self.lamport = self.lamport.max(self.context.max_value()) + 1;
        let schema = self
            .ops
            .iter()
            .map(Op::min_schema)
            .max()
            .unwrap_or(2)
            .max(2)
            .min(MAX_SUPPORTED_SCHEMA);
        Ok(Patch {
            schema,
            writer: self.writer.clone(),
            lamport: self.lamport,
            context: self.context.clone(),
            ops: std::mem::take(&mut self.ops),
            reads: (!self.reads.is_empty()).then(|| std::mem::take(&mut self.reads)),
            writes: (!self.writes.is_empty()).then(|| std::mem::take(&mut self.writes)),
        })
    }

    /// Seals the accumulated ops into a patch, writes its blob, builds the
    /// commit envelope, and CAS-updates the writer ref against the tip this
    /// session last observed (captured at `open` time, or after this
    /// session's own prior commit). Returns the new commit sha on success;
    /// on `WRITER_CAS_CONFLICT` another writer raced this ref between this
    /// session's last observation and this commit, and the caller should
    /// re-open a fresh session against the now-current tip.
    pub fn commit(&mut self) -> Result<String> {
        let expected_tip = self.expected_tip.clone();
        let patch = self.seal()?;

        let bytes = crate::codec::encode_patch(&patch)?;
        let patch_oid = self.port.write_blob(&bytes)?;

        let envelope = CommitEnvelope::patch(&self.graph, &self.writer, patch.lamport, &patch_oid, patch.schema)?;
        let tree_entry = format!("100644 blob {patch_oid}\tpatch.cbor");
        let tree_oid = self.port.write_tree(&[tree_entry])?;

        let parents: Vec<String> = expected_tip.clone().into_iter().collect();
        let commit_sha = self
            .port
            .commit(&envelope.render(), &parents, Some(&tree_oid), false)?;

        match self
            .port
            .compare_and_swap_ref(&self.ref_name, expected_tip.as_ref(), &commit_sha)
        {
            Ok(()) => {
                tracing::debug!(
                    graph = %self.graph,
                    writer = %self.writer,
                    lamport = patch.lamport,
                    commit = %commit_sha,
                    "patch committed"
                );
            }
            Err(err) => {
                tracing::warn!(
                    graph = %self.graph,
                    writer = %self.writer,
                    "writer ref CAS conflict"
                );
                return Err(err);
            }
        }

        self.expected_tip = Some(commit_sha.clone());
        Ok(commit_sha)
    }
}
