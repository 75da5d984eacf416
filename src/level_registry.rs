//! Hierarchical table of log identifiers and their levels.
//!
//! Identifiers form a three level tree: modules contain groups, groups contain
//! items. Every node has compiled-in defaults ([`LevelNode`]) and a mutable
//! [`LevelState`] that an operator console can change at runtime. Changing
//! the state of a module or group applies to everything beneath it.

use tracing::debug;

use crate::wire::LEVEL_MAX;

/// Severity levels. Lower is more severe; a message is kept when its level
/// is at or below the configured threshold. Threshold 0 keeps nothing.
pub mod levels {
    pub const NONE: u8 = 0;
    pub const FATAL: u8 = 1;
    pub const ERROR: u8 = 2;
    pub const WARNING: u8 = 3;
    pub const NOTICE: u8 = 4;
    pub const INFO: u8 = 5;
    pub const DEBUG: u8 = 6;
    pub const TRACE: u8 = 7;
    pub const VERBOSE: u8 = 8;
    pub const MAX: u8 = 13;
}

/// Display names indexed by level.
pub const LEVEL_NAMES: [&str; 14] = [
    "NONE", "FATAL", "ERROR", "WARNING", "NOTICE", "INFO", "DEBUG", "TRACE", "VERB1", "VERB2",
    "VERB3", "VERB4", "VERB5", "VERB6",
];

/// Compiled mask with every level present.
pub const ALL_LEVELS: u16 = 0x3FFF;

/// Index of one module, group or item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Module,
    Group,
    Item,
}

/// Whether function enter/exit records are kept, and where.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntranceState {
    #[default]
    Disabled,
    /// Quiet ring only.
    Quiet,
    /// Main ring, mirrored to the quiet ring when one exists.
    Enabled,
}

/// Compiled defaults of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeDefaults {
    /// Bit `n` set keeps level `n` in the build.
    pub compiled_mask: u16,
    pub level: u8,
    pub quiet_level: u8,
    pub entrance: EntranceState,
}

impl Default for NodeDefaults {
    fn default() -> Self {
        Self {
            compiled_mask: ALL_LEVELS,
            level: levels::WARNING,
            quiet_level: levels::DEBUG,
            entrance: EntranceState::Disabled,
        }
    }
}

/// Immutable description of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelNode {
    pub name: &'static str,
    pub kind: NodeKind,
    pub parent: Option<LogId>,
    /// Own mask combined with every ancestor's.
    pub compiled_mask: u16,
    pub default_level: u8,
    pub default_quiet_level: u8,
    pub default_entrance: EntranceState,
}

impl LevelNode {
    pub fn default_state(&self) -> LevelState {
        LevelState {
            level: self.default_level,
            quiet_level: self.default_quiet_level,
            entrance: self.default_entrance,
        }
    }

    /// Whether `level` survived the compiled mask.
    pub fn is_compiled(&self, level: u8) -> bool {
        level <= LEVEL_MAX && self.compiled_mask & (1 << level) != 0
    }
}

/// Runtime state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelState {
    pub level: u8,
    pub quiet_level: u8,
    pub entrance: EntranceState,
}

/// Builds the identifier tree once at startup.
///
/// # Examples
///
/// ```
/// # use ring_recorder::{RegistryBuilder, NodeDefaults};
/// let mut builder = RegistryBuilder::new();
/// let net = builder.module("net", NodeDefaults::default());
/// let tcp = builder.group(net, "tcp", NodeDefaults::default()).unwrap();
/// let rx = builder.item(tcp, "rx", NodeDefaults::default()).unwrap();
/// let registry = builder.build();
/// assert_eq!(registry.find("net.tcp.rx"), Some(rx));
/// ```
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    nodes: Vec<LevelNode>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(&mut self, name: &'static str, defaults: NodeDefaults) -> LogId {
        self.push(name, NodeKind::Module, None, defaults)
    }

    /// Adds a group under `module`. Fails if `module` is not a module.
    pub fn group(&mut self, module: LogId, name: &'static str, defaults: NodeDefaults) -> Option<LogId> {
        self.child(module, NodeKind::Module, NodeKind::Group, name, defaults)
    }

    /// Adds an item under `group`. Fails if `group` is not a group.
    pub fn item(&mut self, group: LogId, name: &'static str, defaults: NodeDefaults) -> Option<LogId> {
        self.child(group, NodeKind::Group, NodeKind::Item, name, defaults)
    }

    pub fn build(self) -> LevelRegistry {
        let states = self.nodes.iter().map(LevelNode::default_state).collect();
        LevelRegistry {
            nodes: self.nodes,
            states,
        }
    }

    fn child(
        &mut self,
        parent: LogId,
        parent_kind: NodeKind,
        kind: NodeKind,
        name: &'static str,
        defaults: NodeDefaults,
    ) -> Option<LogId> {
        let parent_node = self.nodes.get(parent.0 as usize)?;
        if parent_node.kind != parent_kind {
            return None;
        }
        let inherited = parent_node.compiled_mask;
        let defaults = NodeDefaults {
            compiled_mask: defaults.compiled_mask & inherited,
            ..defaults
        };
        Some(self.push(name, kind, Some(parent), defaults))
    }

    fn push(&mut self, name: &'static str, kind: NodeKind, parent: Option<LogId>, d: NodeDefaults) -> LogId {
        let id = LogId(self.nodes.len() as u16);
        self.nodes.push(LevelNode {
            name,
            kind,
            parent,
            compiled_mask: d.compiled_mask & ALL_LEVELS,
            default_level: d.level.min(LEVEL_MAX),
            default_quiet_level: d.quiet_level.min(LEVEL_MAX),
            default_entrance: d.entrance,
        });
        id
    }
}

/// The identifier tree with its runtime state.
#[derive(Debug, Clone)]
pub struct LevelRegistry {
    nodes: Vec<LevelNode>,
    states: Vec<LevelState>,
}

impl LevelRegistry {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: LogId) -> Option<&LevelNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn state(&self, id: LogId) -> Option<LevelState> {
        self.states.get(id.0 as usize).copied()
    }

    /// Looks up a dotted path such as `"net.tcp.rx"`.
    pub fn find(&self, path: &str) -> Option<LogId> {
        let mut parent = None;
        let mut found = None;
        for part in path.split('.') {
            let idx = self
                .nodes
                .iter()
                .position(|n| n.parent == parent && n.name == part)?;
            let id = LogId(idx as u16);
            parent = Some(id);
            found = Some(id);
        }
        found
    }

    /// Dotted path of a node.
    pub fn path(&self, id: LogId) -> Option<String> {
        let mut parts = Vec::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            let node = self.node(c)?;
            parts.push(node.name);
            cur = node.parent;
        }
        parts.reverse();
        Some(parts.join("."))
    }

    /// Replaces the state of `id` and every node beneath it. Levels are
    /// clamped to the valid range. Returns `false` for an unknown id.
    pub fn set_state(&mut self, id: LogId, state: LevelState) -> bool {
        let state = LevelState {
            level: state.level.min(LEVEL_MAX),
            quiet_level: state.quiet_level.min(LEVEL_MAX),
            entrance: state.entrance,
        };
        self.update_subtree(id, |s| *s = state)
    }

    pub fn set_level(&mut self, id: LogId, level: u8) -> bool {
        let level = level.min(LEVEL_MAX);
        self.update_subtree(id, |s| s.level = level)
    }

    pub fn set_quiet_level(&mut self, id: LogId, level: u8) -> bool {
        let level = level.min(LEVEL_MAX);
        self.update_subtree(id, |s| s.quiet_level = level)
    }

    pub fn set_entrance(&mut self, id: LogId, entrance: EntranceState) -> bool {
        self.update_subtree(id, |s| s.entrance = entrance)
    }

    /// Restores every node's compiled defaults.
    pub fn reset(&mut self) {
        for (state, node) in self.states.iter_mut().zip(&self.nodes) {
            *state = node.default_state();
        }
    }

    fn is_within(&self, node: LogId, root: LogId) -> bool {
        let mut cur = Some(node);
        while let Some(c) = cur {
            if c == root {
                return true;
            }
            cur = self.node(c).and_then(|n| n.parent);
        }
        false
    }

    fn update_subtree(&mut self, root: LogId, mut apply: impl FnMut(&mut LevelState)) -> bool {
        if self.node(root).is_none() {
            return false;
        }
        let mut touched = 0;
        for idx in 0..self.nodes.len() {
            if self.is_within(LogId(idx as u16), root) {
                apply(&mut self.states[idx]);
                touched += 1;
            }
        }
        debug!(id = root.0, touched, "updated level state");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (LevelRegistry, LogId, LogId, LogId, LogId) {
        let mut b = RegistryBuilder::new();
        let net = b.module("net", NodeDefaults::default());
        let tcp = b.group(net, "tcp", NodeDefaults::default()).unwrap();
        let rx = b.item(tcp, "rx", NodeDefaults::default()).unwrap();
        let fs = b.module("fs", NodeDefaults::default());
        (b.build(), net, tcp, rx, fs)
    }

    #[test]
    fn test_kind_rules() {
        let mut b = RegistryBuilder::new();
        let m = b.module("m", NodeDefaults::default());
        assert!(b.item(m, "bad", NodeDefaults::default()).is_none());
        let g = b.group(m, "g", NodeDefaults::default()).unwrap();
        assert!(b.group(g, "bad", NodeDefaults::default()).is_none());
        assert!(b.group(LogId(99), "bad", NodeDefaults::default()).is_none());
    }

    #[test]
    fn test_module_setting_reaches_items_only_in_subtree() {
        let (mut reg, net, _tcp, rx, fs) = sample();
        assert!(reg.set_level(net, levels::TRACE));
        assert_eq!(reg.state(rx).unwrap().level, levels::TRACE);
        assert_eq!(reg.state(fs).unwrap().level, levels::WARNING);
    }

    #[test]
    fn test_item_setting_does_not_touch_parent() {
        let (mut reg, _net, tcp, rx, _fs) = sample();
        reg.set_quiet_level(rx, 2);
        assert_eq!(reg.state(rx).unwrap().quiet_level, 2);
        assert_eq!(reg.state(tcp).unwrap().quiet_level, levels::DEBUG);
    }

    #[test]
    fn test_levels_are_clamped_and_reset() {
        let (mut reg, net, _, rx, _) = sample();
        reg.set_level(net, 200);
        assert_eq!(reg.state(rx).unwrap().level, LEVEL_MAX);
        reg.reset();
        assert_eq!(reg.state(rx).unwrap().level, levels::WARNING);
    }

    #[test]
    fn test_compiled_mask_is_inherited() {
        let mut b = RegistryBuilder::new();
        let m = b.module(
            "m",
            NodeDefaults {
                compiled_mask: ALL_LEVELS & !(1 << levels::DEBUG),
                ..NodeDefaults::default()
            },
        );
        let g = b.group(m, "g", NodeDefaults::default()).unwrap();
        let reg = b.build();
        assert!(!reg.node(g).unwrap().is_compiled(levels::DEBUG));
        assert!(reg.node(g).unwrap().is_compiled(levels::INFO));
    }

    #[test]
    fn test_paths() {
        let (mut reg, _, _, rx, _) = sample();
        assert_eq!(reg.path(rx).as_deref(), Some("net.tcp.rx"));
        assert_eq!(reg.find("net.udp"), None);
        assert!(!reg.set_level(LogId(42), 1));
    }
}
