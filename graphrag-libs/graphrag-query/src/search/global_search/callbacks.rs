use std::sync::Mutex;

use super::search::MapResponse;

/// Observer for the map phase of a global search.
pub trait GlobalSearchCallback: Send + Sync {
    fn on_map_response_start(&self, map_response_contexts: &[String]);

    fn on_map_response_end(&self, map_response_outputs: &[MapResponse]);
}

/// Keeps the contexts and outputs of the last map phase.
#[derive(Default)]
pub struct GlobalSearchLLMCallback {
    map_response_contexts: Mutex<Vec<String>>,
    map_response_outputs: Mutex<Vec<MapResponse>>,
}

impl GlobalSearchLLMCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map_response_contexts(&self) -> Vec<String> {
        self.map_response_contexts
            .lock()
            .map(|contexts| contexts.clone())
            .unwrap_or_default()
    }

    pub fn map_response_outputs(&self) -> Vec<MapResponse> {
        self.map_response_outputs
            .lock()
            .map(|outputs| outputs.clone())
            .unwrap_or_default()
    }
}

impl GlobalSearchCallback for GlobalSearchLLMCallback {
    fn on_map_response_start(&self, map_response_contexts: &[String]) {
        if let Ok(mut contexts) = self.map_response_contexts.lock() {
            *contexts = map_response_contexts.to_vec();
        }
    }

    fn on_map_response_end(&self, map_response_outputs: &[MapResponse]) {
        if let Ok(mut outputs) = self.map_response_outputs.lock() {
            *outputs = map_response_outputs.to_vec();
        }
    }
}
