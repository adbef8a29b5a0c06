use crate::orchestrator::LprPipeline;
use std::sync::Arc;

#[derive(Clone)]
pub struct LprServiceState {
    inner: Arc<LprServiceStateInner>,
}

struct LprServiceStateInner {
    node_id: String,
    pipeline: LprPipeline,
    max_upload_bytes: usize,
}

impl LprServiceState {
    pub fn new(node_id: String, pipeline: LprPipeline, max_upload_bytes: usize) -> Self {
        Self {
            inner: Arc::new(LprServiceStateInner {
                node_id,
                pipeline,
                max_upload_bytes,
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn pipeline(&self) -> &LprPipeline {
        &self.inner.pipeline
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.inner.max_upload_bytes
    }
}
