//! Document tree: bodies, blocks and attributes
//!
//! A [`Body`] keeps its items in source order. Comments and blank lines are
//! items too, so a document survives a parse/print round trip.

use std::fmt::{self, Display, Formatter};

use crate::error::ParseError;
use crate::expression::{quote, Expression};
use crate::parser;
use crate::printer;

/// Parsed configuration file
pub type Document = Body;

/// Block label
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Label {
    /// `"name"`
    Quoted(String),
    /// `name`
    Bare(String),
}

impl Label {
    /// Label value without quotes
    #[inline]
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Quoted(v) | Self::Bare(v) => v,
        }
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quoted(v) => f.write_str(&quote(v)),
            Self::Bare(v) => f.write_str(v),
        }
    }
}

/// `name = expression`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name
    pub name: String,

    /// Value expression
    pub expr: Expression,

    /// Comment on the same line after the value
    pub trailing_comment: Option<String>,

    /// Spaces between name and `=` when the source aligned it; 0 prints one
    pub padding: usize,
}

impl Attribute {
    /// Create an attribute
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, expr: Expression) -> Self {
        Self {
            name: name.into(),
            expr,
            trailing_comment: None,
            padding: 0,
        }
    }
}

/// Typed, labeled block with a nested body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Block type (`resource`, `lifecycle`, `rules`, ...)
    pub ident: String,

    /// Labels after the type
    pub labels: Vec<Label>,

    /// Block contents
    pub body: Body,
}

impl Block {
    /// Create an empty block without labels
    #[must_use]
    pub fn new(ident: impl Into<String>) -> Self {
        Self {
            ident: ident.into(),
            labels: Vec::new(),
            body: Body::new(),
        }
    }

    /// `resource "<type>" "<name>"` block
    #[must_use]
    pub fn resource(kind: &str, resource_type: &str, name: &str) -> Self {
        Self::new(kind)
            .with_label(resource_type)
            .with_label(name)
    }

    /// Add a quoted label
    #[inline]
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(Label::Quoted(label.into()));
        self
    }

    /// Add an attribute
    #[inline]
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, expr: Expression) -> Self {
        self.body.push_attribute(Attribute::new(name, expr));
        self
    }

    /// Add a nested block
    #[inline]
    #[must_use]
    pub fn with_block(mut self, block: Block) -> Self {
        self.body.push_block(block);
        self
    }

    /// Label value at `index`
    #[inline]
    #[must_use]
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(Label::value)
    }

    /// Replace the label at `index`, keeping its quoting style
    pub fn set_label(&mut self, index: usize, value: impl Into<String>) {
        if let Some(label) = self.labels.get_mut(index) {
            *label = match label {
                Label::Quoted(_) => Label::Quoted(value.into()),
                Label::Bare(_) => Label::Bare(value.into()),
            };
        }
    }
}

/// One item in a body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Structure {
    /// `name = value`
    Attribute(Attribute),
    /// Nested block
    Block(Block),
    /// Standalone comment line
    Comment(String),
    /// Blank separator line
    BlankLine,
}

/// Ordered sequence of attributes, blocks, comments and blank lines
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Body {
    items: Vec<Structure>,
}

impl Body {
    /// Create an empty body
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Parse a configuration document
    ///
    /// # Errors
    /// Returns [`ParseError`] with the position of the first problem.
    pub fn parse(src: &str) -> Result<Self, ParseError> {
        parser::parse_body(src)
    }

    /// Print the body as configuration text
    #[must_use]
    pub fn to_hcl(&self) -> String {
        printer::print_body(self)
    }

    /// All items in order
    #[inline]
    #[must_use]
    pub fn items(&self) -> &[Structure] {
        &self.items
    }

    /// Mutable access to the items
    #[inline]
    pub fn items_mut(&mut self) -> &mut Vec<Structure> {
        &mut self.items
    }

    /// No attributes and no blocks (comments do not count)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self
            .items
            .iter()
            .any(|i| matches!(i, Structure::Attribute(_) | Structure::Block(_)))
    }

    /// Attributes in order
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.items.iter().filter_map(|i| match i {
            Structure::Attribute(a) => Some(a),
            _ => None,
        })
    }

    /// Blocks in order
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.items.iter().filter_map(|i| match i {
            Structure::Block(b) => Some(b),
            _ => None,
        })
    }

    /// Mutable blocks in order
    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut Block> {
        self.items.iter_mut().filter_map(|i| match i {
            Structure::Block(b) => Some(b),
            _ => None,
        })
    }

    /// Blocks of one type, in order
    pub fn blocks_of_type<'a>(&'a self, ident: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
        self.blocks().filter(move |b| b.ident == ident)
    }

    /// First block of one type
    #[must_use]
    pub fn first_block(&self, ident: &str) -> Option<&Block> {
        self.blocks().find(|b| b.ident == ident)
    }

    /// First block of one type, mutable
    pub fn first_block_mut(&mut self, ident: &str) -> Option<&mut Block> {
        self.blocks_mut().find(|b| b.ident == ident)
    }

    /// Attribute by name
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes().find(|a| a.name == name)
    }

    /// Attribute by name, mutable
    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.items.iter_mut().find_map(|i| match i {
            Structure::Attribute(a) if a.name == name => Some(a),
            _ => None,
        })
    }

    /// Expression of an attribute
    #[must_use]
    pub fn expr(&self, name: &str) -> Option<&Expression> {
        self.attribute(name).map(|a| &a.expr)
    }

    /// Check whether an attribute exists
    #[inline]
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Append an attribute at the end
    pub fn push_attribute(&mut self, attr: Attribute) {
        self.items.push(Structure::Attribute(attr));
    }

    /// Append a block at the end
    pub fn push_block(&mut self, block: Block) {
        self.items.push(Structure::Block(block));
    }

    /// Insert an item at `index` (clamped to the end)
    pub fn insert(&mut self, index: usize, item: Structure) {
        let index = index.min(self.items.len());
        self.items.insert(index, item);
    }

    /// Set an attribute value
    ///
    /// An existing attribute keeps its position; a new one is placed after
    /// the last attribute so attributes stay ahead of nested blocks.
    pub fn set_attribute(&mut self, name: &str, expr: Expression) {
        if let Some(existing) = self.attribute_mut(name) {
            existing.expr = expr;
            return;
        }
        let index = self
            .items
            .iter()
            .rposition(|i| matches!(i, Structure::Attribute(_)))
            .map_or(0, |i| i + 1);
        self.items
            .insert(index, Structure::Attribute(Attribute::new(name, expr)));
    }

    /// Set an attribute at a given item position, replacing any existing
    /// attribute of the same name
    pub fn set_attribute_at(&mut self, index: usize, name: &str, expr: Expression) {
        if let Some(pos) = self.position_of_attribute(name) {
            self.items.remove(pos);
            let index = if pos < index { index - 1 } else { index };
            self.insert(index, Structure::Attribute(Attribute::new(name, expr)));
        } else {
            self.insert(index, Structure::Attribute(Attribute::new(name, expr)));
        }
    }

    /// Remove an attribute, returning it
    pub fn remove_attribute(&mut self, name: &str) -> Option<Attribute> {
        let pos = self.position_of_attribute(name)?;
        match self.items.remove(pos) {
            Structure::Attribute(a) => Some(a),
            _ => None,
        }
    }

    /// Rename an attribute in place
    ///
    /// No-op when the source is absent or the destination already exists.
    pub fn rename_attribute(&mut self, from: &str, to: &str) -> bool {
        if from == to || self.has_attribute(to) {
            return false;
        }
        match self.attribute_mut(from) {
            Some(attr) => {
                attr.name = to.to_string();
                attr.padding = 0;
                true
            }
            None => false,
        }
    }

    fn position_of_attribute(&self, name: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|i| matches!(i, Structure::Attribute(a) if a.name == name))
    }

    /// Remove every block of one type
    ///
    /// Returns the item index where the first block was, and the blocks in
    /// document order. `None` when there was no such block.
    pub fn take_blocks(&mut self, ident: &str) -> Option<(usize, Vec<Block>)> {
        let first = self
            .items
            .iter()
            .position(|i| matches!(i, Structure::Block(b) if b.ident == ident))?;
        let mut taken = Vec::new();
        let mut kept = Vec::with_capacity(self.items.len());
        for item in self.items.drain(..) {
            match item {
                Structure::Block(b) if b.ident == ident => taken.push(b),
                other => kept.push(other),
            }
        }
        self.items = kept;
        Some((first, taken))
    }

    /// Remove the first block of one type
    pub fn take_first_block(&mut self, ident: &str) -> Option<(usize, Block)> {
        let pos = self
            .items
            .iter()
            .position(|i| matches!(i, Structure::Block(b) if b.ident == ident))?;
        match self.items.remove(pos) {
            Structure::Block(b) => Some((pos, b)),
            _ => None,
        }
    }

    /// Drop blank lines at the edges and collapse runs of them
    pub fn tidy_blank_lines(&mut self) {
        let mut out: Vec<Structure> = Vec::with_capacity(self.items.len());
        for item in self.items.drain(..) {
            if matches!(item, Structure::BlankLine)
                && matches!(out.last(), None | Some(Structure::BlankLine))
            {
                continue;
            }
            out.push(item);
        }
        while matches!(out.last(), Some(Structure::BlankLine)) {
            out.pop();
        }
        self.items = out;
    }

    /// Visit every expression in this body and all nested bodies
    pub fn visit_expressions_mut(&mut self, visit: &mut dyn FnMut(&mut Expression)) {
        for item in &mut self.items {
            match item {
                Structure::Attribute(a) => visit(&mut a.expr),
                Structure::Block(b) => b.body.visit_expressions_mut(visit),
                Structure::Comment(_) | Structure::BlankLine => {}
            }
        }
    }
}

impl Display for Body {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hcl())
    }
}

impl FromIterator<Structure> for Body {
    fn from_iter<I: IntoIterator<Item = Structure>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(src: &str) -> Body {
        Body::parse(src).unwrap()
    }

    #[test]
    fn set_attribute_after_last_attribute() {
        let mut b = body("a = 1\nnested {\n}\n");
        b.set_attribute("z", Expression::number(2));
        let names: Vec<_> = b.attributes().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a", "z"]);
        assert!(matches!(b.items()[1], Structure::Attribute(_)));
    }

    #[test]
    fn rename_attribute_refuses_clobber() {
        let mut b = body("a = 1\nb = 2\n");
        assert!(!b.rename_attribute("a", "b"));
        assert!(b.rename_attribute("a", "c"));
        assert!(b.has_attribute("c"));
        assert!(!b.rename_attribute("missing", "x"));
    }

    #[test]
    fn take_blocks_preserves_order_and_position() {
        let mut b = body("x = 1\nr {\n  n = 1\n}\ny = 2\nr {\n  n = 2\n}\n");
        let (index, blocks) = b.take_blocks("r").unwrap();
        assert_eq!(index, 1);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].body.expr("n").unwrap().source(), "2");
        assert_eq!(b.attributes().count(), 2);
        assert!(b.take_blocks("r").is_none());
    }

    #[test]
    fn labels() {
        let mut block = Block::resource("resource", "a_type", "main");
        assert_eq!(block.label(0), Some("a_type"));
        block.set_label(0, "b_type");
        assert_eq!(block.labels[0].to_string(), "\"b_type\"");
    }

    #[test]
    fn tidy_blank_lines_collapses_runs() {
        let mut b: Body = vec![
            Structure::BlankLine,
            Structure::Comment("# x".into()),
            Structure::BlankLine,
            Structure::BlankLine,
            Structure::Comment("# y".into()),
            Structure::BlankLine,
        ]
        .into_iter()
        .collect();
        b.tidy_blank_lines();
        assert_eq!(b.items().len(), 3);
    }
}
