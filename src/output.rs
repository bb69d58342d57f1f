//! Output of decoded messages as a tree of labeled nodes and as JSON.
//!
//! The decoder writes each value through an [`OutputProjector`], which
//! forwards it to a [`TreeSink`] and, optionally, to a [`JsonSink`]. The
//! tree shows every field as it appeared on the wire along with any
//! diagnostics. The JSON output follows the Protocol Buffers JSON mapping.

use smallvec::SmallVec;

use crate::errors::Diagnostic;
use crate::options::DecodeOptions;
use crate::scalar::DecodedValue;
use crate::timestamp::format_timestamp;

mod json;
mod tree;

pub use json::{json_value, DuplicateMember, JsonBuilder, JsonSink};
pub use tree::{DecodeTree, NodeId, TreeNode, TreeSink};

/// Identifies the JSON object member that a field's value is written to.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonMember {
    pub number: u64,
    pub name: String,

    /// Whether consecutive values of the field are grouped into an array.
    pub repeated: bool,

    /// Handling of values of this member which are not grouped together.
    pub duplicate: DuplicateMember,
}

impl JsonMember {
    /// Member for a field which has no schema, named after its number.
    pub fn unnamed(number: u64) -> Self {
        Self {
            number,
            name: number.to_string(),
            repeated: false,
            duplicate: DuplicateMember::Merge,
        }
    }
}

/// State of an open JSON object.
#[derive(Default)]
struct ObjectState {
    /// Field number of the repeated field whose array is currently open.
    open_array: Option<u64>,
}

/// Forwards decoded values to a tree sink and an optional JSON sink.
pub struct OutputProjector<'a> {
    tree: &'a mut dyn TreeSink,
    json: Option<&'a mut dyn JsonSink>,
    objects: SmallVec<[ObjectState; 8]>,
    bytes_as_string: bool,
    utc: bool,
}

impl<'a> OutputProjector<'a> {
    pub fn new(
        tree: &'a mut dyn TreeSink,
        json: Option<&'a mut dyn JsonSink>,
        options: &DecodeOptions,
    ) -> Self {
        Self {
            tree,
            json,
            objects: SmallVec::new(),
            bytes_as_string: options.dissect_bytes_as_string,
            utc: options.use_utc_for_timestamps,
        }
    }

    /// Return the tree's root node.
    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    /// Return true if JSON output is enabled.
    pub fn has_json(&self) -> bool {
        self.json.is_some()
    }

    /// Add a tree node without a value.
    pub fn node(&mut self, parent: NodeId, label: String) -> NodeId {
        self.tree.append(parent, label, None)
    }

    pub fn set_label(&mut self, node: NodeId, label: String) {
        self.tree.set_label(node, label);
    }

    pub fn attach_diagnostic(&mut self, node: NodeId, diagnostic: Diagnostic) {
        self.tree.attach_diagnostic(node, diagnostic);
    }

    /// Add a tree node for an embedded message.
    pub fn message_node(&mut self, parent: NodeId, prefix: &str, type_name: Option<&str>) -> NodeId {
        let value = DecodedValue::Message {
            type_name: type_name.map(|s| s.to_string()),
        };
        let label = format!("{}: {}", prefix, value);
        self.tree.append(parent, label, Some(value))
    }

    /// Format a value for display in the tree.
    pub fn display_value(&self, value: &DecodedValue) -> String {
        match value {
            DecodedValue::Bytes(bytes) if self.bytes_as_string => {
                format!("{:?}", String::from_utf8_lossy(bytes))
            }
            DecodedValue::Timestamp { seconds, nanos } if !self.utc => {
                format_timestamp(*seconds, *nanos, false).unwrap_or_else(|| value.to_string())
            }
            _ => value.to_string(),
        }
    }

    /// Write a field value to the tree and, if `member` is set, to JSON.
    ///
    /// The tree label is `"{prefix}: {value}"`. Generated values are marked
    /// as such.
    pub fn value(
        &mut self,
        parent: NodeId,
        prefix: &str,
        value: DecodedValue,
        member: Option<&JsonMember>,
        generated: bool,
    ) -> NodeId {
        if let Some(member) = member {
            self.json_value(member, &value);
        }
        let mut label = format!("{}: {}", prefix, self.display_value(&value));
        if generated {
            label.push_str(" [generated]");
        }
        self.tree.append(parent, label, Some(value))
    }

    /// Write a value to the JSON sink only.
    pub fn json_value(&mut self, member: &JsonMember, value: &DecodedValue) {
        if self.json.is_none() {
            return;
        }
        self.select_member(member);
        let utc = self.utc;
        if let Some(json) = self.json.as_mut() {
            json.write_value(json_value(value, utc));
        }
    }

    /// Write a value as the top-level JSON value.
    pub fn json_root_value(&mut self, value: &DecodedValue) {
        let utc = self.utc;
        if let Some(json) = self.json.as_mut() {
            json.write_value(json_value(value, utc));
        }
    }

    /// Open a JSON object, either at the top level or as the value of
    /// `member` in the current object.
    pub fn begin_object(&mut self, member: Option<&JsonMember>) {
        if self.json.is_none() {
            return;
        }
        if let Some(member) = member {
            self.select_member(member);
        }
        if let Some(json) = self.json.as_mut() {
            json.begin_object();
        }
        self.objects.push(ObjectState::default());
    }

    /// Close the JSON object opened by the last call to `begin_object`.
    pub fn end_object(&mut self) {
        let Some(json) = self.json.as_mut() else {
            return;
        };
        if let Some(state) = self.objects.pop() {
            if state.open_array.is_some() {
                json.end_array();
            }
            json.end_object();
        }
    }

    /// Prepare to write the value of `member` in the current object.
    ///
    /// Consecutive values of a repeated field are grouped into one array,
    /// which is closed when a different field is written or the object ends.
    fn select_member(&mut self, member: &JsonMember) {
        let Some(json) = self.json.as_mut() else {
            return;
        };
        let Some(state) = self.objects.last_mut() else {
            return;
        };

        if let Some(open) = state.open_array {
            if open == member.number && member.repeated {
                return;
            }
            json.end_array();
            state.open_array = None;
        }

        json.set_member_name(&member.name, member.duplicate);
        if member.repeated {
            json.begin_array();
            state.open_array = Some(member.number);
        }
    }
}
