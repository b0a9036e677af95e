use std::collections::BTreeMap;

use crate::llm::chat::{ToolCall, ToolCallFunction};

/// An incremental tool-call fragment as carried by one streaming delta.
#[derive(Debug, Clone, Default)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub function_name: Option<String>,
    pub function_arguments: Option<String>,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
    announced: bool,
}

impl PartialCall {
    fn as_tool_call(&self) -> ToolCall {
        ToolCall {
            id: self.id.clone().unwrap_or_default(),
            function: ToolCallFunction {
                name: self.name.clone(),
                arguments: self.arguments.clone(),
            },
        }
    }
}

/// Accumulates streamed tool-call deltas keyed by stream index.
///
/// `id` overwrites once set; `function.name` and `function.arguments` append
/// in arrival order. A call is announced exactly once, the first time its
/// name is non-empty and its id is known.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    calls: BTreeMap<usize, PartialCall>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one delta; returns the call to announce, if it just stabilized.
    pub fn apply(&mut self, delta: ToolCallDelta) -> Option<ToolCall> {
        let slot = self.calls.entry(delta.index).or_default();
        if let Some(id) = delta.id {
            slot.id = Some(id);
        }
        if let Some(name) = delta.function_name {
            slot.name.push_str(&name);
        }
        if let Some(arguments) = delta.function_arguments {
            slot.arguments.push_str(&arguments);
        }

        if !slot.announced && slot.id.is_some() && !slot.name.is_empty() {
            slot.announced = true;
            return Some(slot.as_tool_call());
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// The fully assembled calls, ordered by stream index.
    pub fn finish(self) -> Vec<ToolCall> {
        self.calls.into_values().map(|c| c.as_tool_call()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announces_once_when_id_and_name_are_known() {
        let mut assembler = ToolCallAssembler::new();

        // Name arrives before the id: nothing to announce yet.
        let announced = assembler.apply(ToolCallDelta {
            index: 0,
            function_name: Some("search".into()),
            ..ToolCallDelta::default()
        });
        assert!(announced.is_none());

        let announced = assembler.apply(ToolCallDelta {
            index: 0,
            id: Some("call_1".into()),
            function_arguments: Some("{\"q\":".into()),
            ..ToolCallDelta::default()
        });
        let call = announced.expect("stabilized call");
        assert_eq!(call.id, "call_1");
        assert_eq!(call.function.name, "search");

        // Further argument fragments never re-announce.
        let announced = assembler.apply(ToolCallDelta {
            index: 0,
            function_arguments: Some("\"rust\"}".into()),
            ..ToolCallDelta::default()
        });
        assert!(announced.is_none());

        let finished = assembler.finish();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].function.arguments, "{\"q\":\"rust\"}");
    }

    #[test]
    fn name_fragments_concatenate_in_arrival_order() {
        let mut assembler = ToolCallAssembler::new();
        assembler.apply(ToolCallDelta {
            index: 0,
            id: Some("call_9".into()),
            function_name: Some("get_".into()),
            ..ToolCallDelta::default()
        });
        assembler.apply(ToolCallDelta {
            index: 0,
            function_name: Some("weather".into()),
            ..ToolCallDelta::default()
        });

        let finished = assembler.finish();
        assert_eq!(finished[0].function.name, "get_weather");
    }

    #[test]
    fn interleaved_indices_assemble_independently_and_order_by_index() {
        let mut assembler = ToolCallAssembler::new();
        assembler.apply(ToolCallDelta {
            index: 1,
            id: Some("call_b".into()),
            function_name: Some("second".into()),
            ..ToolCallDelta::default()
        });
        assembler.apply(ToolCallDelta {
            index: 0,
            id: Some("call_a".into()),
            function_name: Some("first".into()),
            ..ToolCallDelta::default()
        });
        assembler.apply(ToolCallDelta {
            index: 1,
            function_arguments: Some("{}".into()),
            ..ToolCallDelta::default()
        });

        let finished = assembler.finish();
        assert_eq!(finished.len(), 2);
        assert_eq!(finished[0].id, "call_a");
        assert_eq!(finished[1].id, "call_b");
        assert_eq!(finished[1].function.arguments, "{}");
    }

    #[test]
    fn id_overwrites_once_set() {
        let mut assembler = ToolCallAssembler::new();
        assembler.apply(ToolCallDelta {
            index: 0,
            id: Some("tmp".into()),
            function_name: Some("fn".into()),
            ..ToolCallDelta::default()
        });
        assembler.apply(ToolCallDelta {
            index: 0,
            id: Some("final".into()),
            ..ToolCallDelta::default()
        });

        let finished = assembler.finish();
        assert_eq!(finished[0].id, "final");
    }
}
