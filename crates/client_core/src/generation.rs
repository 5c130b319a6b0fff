use shared::domain::Generation;

/// Tracks which query generation a view currently accepts results for.
///
/// The guard does not lock anything by itself: it lives inside the sink state so the
/// staleness check and the mutation it protects happen under one lock.
#[derive(Debug, Default)]
pub struct GenerationGuard {
    current: Generation,
}

impl GenerationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Generation {
        self.current
    }

    pub fn advance(&mut self) -> Generation {
        self.current = self.current.next();
        self.current
    }

    pub fn is_stale(&self, generation: Generation) -> bool {
        generation != self.current
    }
}
