//! Tool implementations for Brook.
//!
//! Brook ships a single tool: web search. The registry seam stays generic
//! so tests can register stubs and the agent loop never names a concrete
//! tool type.

pub mod web_search;

pub use web_search::{SearchResult, WebSearchTool};

use brook_core::tool::ToolRegistry;

/// Create the tool registry for a deployment: just the web search tool.
pub fn search_registry(api_key: Option<String>, max_results: u32) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(WebSearchTool::new(api_key, max_results)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_contains_web_search() {
        let registry = search_registry(None, 4);
        assert!(registry.get("web_search").is_some());
        assert_eq!(registry.names(), vec!["web_search"]);
    }
}
