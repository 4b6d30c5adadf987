/// Counters accumulated by a [`crate::DrawContext`] since creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub draws: u64,
    pub passthrough_draws: u64,
    /// Batches handed to a middle end (`run` or `run_linear`).
    pub batches: u64,
    pub pipeline_batches: u64,
    pub emit_batches: u64,
    pub vertices_fetched: u64,
    /// Hardware vertices written by every path.
    pub vertices_emitted: u64,
    /// `draw` calls made by the pipeline's emission stage.
    pub index_flushes: u64,
    /// Vertex buffers released by the pipeline's emission stage.
    pub vertex_flushes: u64,
    pub translate_hits: u64,
    pub translate_misses: u64,
}

/// Counters owned by the emission stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct VbufStats {
    pub vertices_emitted: u64,
    pub index_flushes: u64,
    pub vertex_flushes: u64,
}
