//! Plan tree: the intermediate representation between a query and SQL text.
//!
//! A plan is an arena of [`SelectBlock`]s keyed by alias. Blocks refer to
//! each other by alias (as a FROM source or a join child), so tree-level
//! rewrite passes can mutate any block in place without chasing owned
//! pointers. One compilation owns one tree; it is consumed by the emitter.

pub mod builder;

pub use builder::Builder;

use std::collections::{BTreeMap, HashSet};

use crate::error::{CompileError, CompileResult};
use crate::sql::TokenStream;

/// Alias of the outermost block.
pub const ROOT_ALIAS: &str = "base";
/// Period children of a comparison query.
pub const BASE_PERIOD_ALIAS: &str = "base_period";
pub const COMPARISON_PERIOD_ALIAS: &str = "comparison_period";

/// One selected column.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    /// Output name; unique within the block.
    pub name: String,
    pub display_name: String,
    pub expr: TokenStream,
}

impl FieldNode {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>, expr: TokenStream) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            expr,
        }
    }
}

/// Where a block reads rows from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Table { schema: Option<String>, name: String },
    /// Another block in the same tree, by alias.
    Block(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Left,
    Right,
    Full,
    Cross,
}

impl std::fmt::Display for JoinKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::Full => "full",
            JoinKind::Cross => "cross",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinChild {
    pub block: String,
    pub kind: JoinKind,
    /// Join predicate; `None` only for cross joins.
    pub on: Option<TokenStream>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderField {
    /// Name of a field in the same block.
    pub name: String,
    pub desc: bool,
}

/// One SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectBlock {
    pub alias: String,
    pub dimensions: Vec<FieldNode>,
    pub measures: Vec<FieldNode>,
    pub source: Source,
    pub joins: Vec<JoinChild>,
    pub filter: Option<TokenStream>,
    /// Group by the dimension fields.
    pub group_by: bool,
    pub having: Option<TokenStream>,
    pub order: Vec<OrderField>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Set once measures have been wrapped for relaxed-grouping backends.
    pub normalized: bool,
}

impl SelectBlock {
    pub fn new(alias: impl Into<String>, source: Source) -> Self {
        Self {
            alias: alias.into(),
            dimensions: vec![],
            measures: vec![],
            source,
            joins: vec![],
            filter: None,
            group_by: false,
            having: None,
            order: vec![],
            limit: None,
            offset: None,
            normalized: false,
        }
    }

    /// Dimensions then measures, in select order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldNode> {
        self.dimensions.iter().chain(self.measures.iter())
    }

    pub fn field(&self, name: &str) -> Option<&FieldNode> {
        self.fields().find(|f| f.name == name)
    }

    /// Aggregates directly over a table, so post-aggregation filters belong
    /// in HAVING.
    pub fn is_aggregate(&self) -> bool {
        matches!(self.source, Source::Table { .. }) && !self.measures.is_empty()
    }

    /// AND `predicate` into the WHERE clause.
    pub fn add_filter(&mut self, predicate: TokenStream) {
        self.filter = Some(match self.filter.take() {
            Some(existing) => TokenStream::join(&[existing, predicate], crate::sql::Token::And),
            None => predicate,
        });
    }

    /// Aliases of blocks this one reads from.
    pub fn children(&self) -> impl Iterator<Item = &str> {
        let source = match &self.source {
            Source::Block(alias) => Some(alias.as_str()),
            Source::Table { .. } => None,
        };
        source
            .into_iter()
            .chain(self.joins.iter().map(|j| j.block.as_str()))
    }

    fn check_unique_fields(&self) -> CompileResult<()> {
        let mut seen = HashSet::new();
        for field in self.fields() {
            if !seen.insert(field.name.as_str()) {
                return Err(CompileError::invariant(format!(
                    "block '{}' selects '{}' twice",
                    self.alias, field.name
                )));
            }
        }
        Ok(())
    }
}

/// The two period children of a comparison query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonJoin {
    pub base: String,
    pub comparison: String,
}

/// Arena of blocks for one compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanTree {
    root: String,
    blocks: BTreeMap<String, SelectBlock>,
    /// Set when the root joins a base and a comparison period.
    pub comparison: Option<ComparisonJoin>,
}

impl PlanTree {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            blocks: BTreeMap::new(),
            comparison: None,
        }
    }

    /// Add a block. Aliases are unique tree-wide.
    pub fn insert(&mut self, block: SelectBlock) -> CompileResult<()> {
        if self.blocks.contains_key(&block.alias) {
            return Err(CompileError::invariant(format!(
                "duplicate block alias '{}'",
                block.alias
            )));
        }
        block.check_unique_fields()?;
        self.blocks.insert(block.alias.clone(), block);
        Ok(())
    }

    pub fn root(&self) -> CompileResult<&SelectBlock> {
        self.block(&self.root)
    }

    pub fn root_mut(&mut self) -> CompileResult<&mut SelectBlock> {
        let root = self.root.clone();
        self.block_mut(&root)
    }

    pub fn block(&self, alias: &str) -> CompileResult<&SelectBlock> {
        self.blocks
            .get(alias)
            .ok_or_else(|| CompileError::invariant(format!("no block with alias '{alias}'")))
    }

    pub fn block_mut(&mut self, alias: &str) -> CompileResult<&mut SelectBlock> {
        self.blocks
            .get_mut(alias)
            .ok_or_else(|| CompileError::invariant(format!("no block with alias '{alias}'")))
    }

    pub fn blocks(&self) -> impl Iterator<Item = &SelectBlock> {
        self.blocks.values()
    }

    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut SelectBlock> {
        self.blocks.values_mut()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
