//! Generic dependency graph, transformer pipeline and concurrent walker.

mod dag;
mod transform;
mod walk;

pub use dag::{Graph, Vertex, VertexId};
pub use transform::{GraphBuilder, GraphTransformer, Multi};
pub use walk::{Visit, Visitor, WalkReport, Walker};
