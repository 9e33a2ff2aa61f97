//! Resolver Tracing Extension
//!
//! Records when each field resolver starts and ends and reports the result as
//! an Apollo federated trace: a `Trace` protobuf, base64 encoded, under the
//! `ftv1` response extension. Gateways that understand federated tracing can
//! stitch it into their own reports.
//!
//! Timings are nanoseconds relative to the start of the request. Nodes are
//! keyed by response path; a node's parent is the path without its last
//! segment, and list-index nodes (which never resolve on their own) are
//! created on demand.

use async_graphql::extensions::{
    Extension, ExtensionContext, ExtensionFactory, NextRequest, NextResolve, ResolveInfo,
};
use async_graphql::{QueryPathNode, QueryPathSegment, Response, ServerResult, Value};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use prost::Message;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::error::{ApiError, ApiResult};

/// Response extension key the encoded trace is attached under.
pub const FTV1_EXTENSION: &str = "ftv1";

// ============================================================================
// TRACE MESSAGES
// ============================================================================

/// Subset of `mdg.engine.proto.Trace` carried by federated tracing.
#[derive(Clone, PartialEq, Message)]
pub struct Trace {
    #[prost(message, optional, tag = "4")]
    pub start_time: Option<Timestamp>,
    #[prost(message, optional, tag = "3")]
    pub end_time: Option<Timestamp>,
    #[prost(uint64, tag = "11")]
    pub duration_ns: u64,
    #[prost(message, optional, tag = "14")]
    pub root: Option<Node>,
}

/// One resolved field, or one list element.
#[derive(Clone, PartialEq, Message)]
pub struct Node {
    #[prost(oneof = "node::Id", tags = "1, 2")]
    pub id: Option<node::Id>,
    #[prost(string, tag = "14")]
    pub original_field_name: String,
    #[prost(string, tag = "3")]
    pub r#type: String,
    #[prost(string, tag = "13")]
    pub parent_type: String,
    #[prost(uint64, tag = "8")]
    pub start_time: u64,
    #[prost(uint64, tag = "9")]
    pub end_time: u64,
    #[prost(message, repeated, tag = "12")]
    pub child: Vec<Node>,
}

pub mod node {
    #[derive(Clone, PartialEq, Eq, prost::Oneof)]
    pub enum Id {
        #[prost(string, tag = "1")]
        ResponseName(String),
        #[prost(uint32, tag = "2")]
        Index(u32),
    }
}

/// `google.protobuf.Timestamp`.
#[derive(Clone, Copy, PartialEq, Eq, Message)]
pub struct Timestamp {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self {
            seconds: at.timestamp(),
            nanos: at.timestamp_subsec_nanos() as i32,
        }
    }
}

impl Node {
    /// Child whose response name is `name`.
    pub fn child_named(&self, name: &str) -> Option<&Node> {
        self.child
            .iter()
            .find(|c| matches!(&c.id, Some(node::Id::ResponseName(n)) if n == name))
    }

    /// Child for list element `index`.
    pub fn child_at(&self, index: u32) -> Option<&Node> {
        self.child
            .iter()
            .find(|c| c.id == Some(node::Id::Index(index)))
    }
}

/// Decode an `ftv1` extension value back into a [`Trace`].
pub fn decode_ftv1(encoded: &str) -> ApiResult<Trace> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| ApiError::invalid_input(format!("ftv1 is not base64: {}", e)))?;
    Trace::decode(bytes.as_slice())
        .map_err(|e| ApiError::invalid_input(format!("ftv1 is not a trace: {}", e)))
}

// ============================================================================
// PATH TREE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PathKey {
    Index(usize),
    Name(String),
}

fn owned_path(leaf: &QueryPathNode<'_>) -> Vec<PathKey> {
    let mut segments = Vec::new();
    let mut current = Some(leaf);
    while let Some(path_node) = current {
        segments.push(match &path_node.segment {
            QueryPathSegment::Index(index) => PathKey::Index(*index),
            QueryPathSegment::Name(name) => PathKey::Name(name.to_string()),
        });
        current = path_node.parent;
    }
    segments.reverse();
    segments
}

#[derive(Debug, Default)]
struct PendingNode {
    id: Option<node::Id>,
    original_field_name: String,
    return_type: String,
    parent_type: String,
    start_ns: u64,
    end_ns: u64,
    children: Vec<usize>,
}

/// Arena of nodes; index 0 is the root.
#[derive(Debug)]
struct PathTree {
    nodes: Vec<PendingNode>,
    by_path: HashMap<Vec<PathKey>, usize>,
}

impl Default for PathTree {
    fn default() -> Self {
        Self {
            nodes: vec![PendingNode::default()],
            by_path: HashMap::new(),
        }
    }
}

impl PathTree {
    fn ensure(&mut self, path: &[PathKey]) -> usize {
        let Some((last, parent_path)) = path.split_last() else {
            return 0;
        };
        if let Some(&existing) = self.by_path.get(path) {
            return existing;
        }

        let parent = self.ensure(parent_path);
        let id = match last {
            PathKey::Index(index) => node::Id::Index(u32::try_from(*index).unwrap_or(u32::MAX)),
            PathKey::Name(name) => node::Id::ResponseName(name.clone()),
        };

        let index = self.nodes.len();
        self.nodes.push(PendingNode {
            id: Some(id),
            ..PendingNode::default()
        });
        self.nodes[parent].children.push(index);
        self.by_path.insert(path.to_vec(), index);
        index
    }

    fn build(&self, index: usize) -> Node {
        let pending = &self.nodes[index];
        Node {
            id: pending.id.clone(),
            original_field_name: pending.original_field_name.clone(),
            r#type: pending.return_type.clone(),
            parent_type: pending.parent_type.clone(),
            start_time: pending.start_ns,
            end_time: pending.end_ns,
            child: pending.children.iter().map(|&c| self.build(c)).collect(),
        }
    }
}

// ============================================================================
// EXTENSION
// ============================================================================

/// Extension factory; add with `Schema::build(..).extension(ResolverTracing)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolverTracing;

impl ExtensionFactory for ResolverTracing {
    fn create(&self) -> Arc<dyn Extension> {
        Arc::new(ResolverTracingExtension::default())
    }
}

#[derive(Default)]
struct TraceState {
    started: Option<Instant>,
    tree: PathTree,
}

impl TraceState {
    fn elapsed_ns(&self) -> u64 {
        self.started
            .map(|s| u64::try_from(s.elapsed().as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

#[derive(Default)]
struct ResolverTracingExtension {
    state: Mutex<TraceState>,
}

impl ResolverTracingExtension {
    fn lock(&self) -> MutexGuard<'_, TraceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn finish(&self, started_at: DateTime<Utc>) -> String {
        let mut state = self.lock();
        let duration_ns = state.elapsed_ns();
        state.tree.nodes[0].end_ns = duration_ns;

        let trace = Trace {
            start_time: Some(started_at.into()),
            end_time: Some(Utc::now().into()),
            duration_ns,
            root: Some(state.tree.build(0)),
        };
        STANDARD.encode(trace.encode_to_vec())
    }
}

#[async_trait::async_trait]
impl Extension for ResolverTracingExtension {
    async fn request(&self, ctx: &ExtensionContext<'_>, next: NextRequest<'_>) -> Response {
        let started_at = Utc::now();
        self.lock().started = Some(Instant::now());

        let response = next.run(ctx).await;

        let encoded = self.finish(started_at);
        response.extension(FTV1_EXTENSION, Value::String(encoded))
    }

    async fn resolve(
        &self,
        ctx: &ExtensionContext<'_>,
        info: ResolveInfo<'_>,
        next: NextResolve<'_>,
    ) -> ServerResult<Option<Value>> {
        if info.is_for_introspection {
            return next.run(ctx, info).await;
        }

        let path = owned_path(info.path_node);
        let node = {
            let mut state = self.lock();
            let start_ns = state.elapsed_ns();
            let index = state.tree.ensure(&path);
            let pending = &mut state.tree.nodes[index];
            pending.return_type = info.return_type.to_string();
            pending.parent_type = info.parent_type.to_string();
            pending.start_ns = start_ns;
            if let Some(alias) = info.alias.filter(|alias| *alias != info.name) {
                tracing::trace!(alias, field = info.name, "Aliased field");
                pending.original_field_name = info.name.to_string();
            }
            index
        };

        let result = next.run(ctx, info).await;

        let mut state = self.lock();
        let end_ns = state.elapsed_ns();
        state.tree.nodes[node].end_ns = end_ns;
        result
    }
}
