//! Name trees and number trees: PDF's balanced, key-sorted maps.
//!
//! On disk a node is either an interior `<</Kids […] /Limits [min max]>>`
//! or a leaf `<</Names [k v k v …] /Limits [min max]>>` (`/Nums` for
//! number trees). This module materializes a tree into an owned value,
//! supports lookup, insertion and removal, and serializes back to any
//! structurally valid shape; the writer does not care how balanced it is.

use crate::{Dictionary, Document, Error, Object, ParseError, Result};

/// Keys a tree can be sorted on: byte strings for name trees, integers
/// for number trees.
pub trait TreeKey: Ord + Clone {
    /// Entry name of the leaf pair array: `Names` or `Nums`.
    const PAIRS: &'static [u8];
    fn from_object(object: &Object) -> Option<Self>;
    fn to_object(&self) -> Object;
}

impl TreeKey for Vec<u8> {
    const PAIRS: &'static [u8] = b"Names";

    fn from_object(object: &Object) -> Option<Self> {
        object.as_str().ok().map(<[u8]>::to_vec)
    }

    fn to_object(&self) -> Object {
        Object::string_literal(self.clone())
    }
}

impl TreeKey for i64 {
    const PAIRS: &'static [u8] = b"Nums";

    fn from_object(object: &Object) -> Option<Self> {
        object.as_i64().ok()
    }

    fn to_object(&self) -> Object {
        Object::Integer(*self)
    }
}

/// How many pairs (or kids) a node holds before it splits.
const NODE_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
enum Node<K> {
    Leaf(Vec<(K, Object)>),
    Interior(Vec<Node<K>>),
}

#[derive(Debug, Clone)]
pub struct Tree<K: TreeKey> {
    root: Node<K>,
    capacity: usize,
}

/// A name tree: byte-string keys in lexical order.
pub type NameTree = Tree<Vec<u8>>;
/// A number tree: integer keys in ascending order.
pub type NumberTree = Tree<i64>;

impl<K: TreeKey> Default for Tree<K> {
    fn default() -> Self {
        Tree::new()
    }
}

impl<K: TreeKey> Tree<K> {
    pub fn new() -> Self {
        Tree {
            root: Node::Leaf(Vec::new()),
            capacity: NODE_CAPACITY,
        }
    }

    #[cfg(test)]
    fn with_capacity_for_test(capacity: usize) -> Self {
        Tree {
            root: Node::Leaf(Vec::new()),
            capacity,
        }
    }

    /// Materializes a tree from its root dictionary, following kid
    /// references through the document.
    pub fn load(document: &Document, root: &Dictionary) -> Result<Self> {
        let mut depth_guard = 0;
        let root = Self::load_node(document, root, &mut depth_guard)?;
        Ok(Tree {
            root,
            capacity: NODE_CAPACITY,
        })
    }

    fn load_node(document: &Document, dict: &Dictionary, depth: &mut usize) -> Result<Node<K>> {
        *depth += 1;
        if *depth > 128 {
            return Err(Error::Parse(ParseError::InvalidObject(0)));
        }
        if let Ok(kids) = dict.get(b"Kids") {
            let mut nodes = Vec::new();
            for kid in document.dereference_array(kids)? {
                let kid_dict = document.dereference_dict(kid)?;
                nodes.push(Self::load_node(document, kid_dict, depth)?);
            }
            *depth -= 1;
            return Ok(Node::Interior(nodes));
        }
        let pairs_entry = dict.get(K::PAIRS)?;
        let pairs_array = document.dereference_array(pairs_entry)?;
        let mut pairs = Vec::with_capacity(pairs_array.len() / 2);
        let mut iter = pairs_array.iter();
        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            let Some(key) = K::from_object(key) else { continue };
            pairs.push((key, value.clone()));
        }
        *depth -= 1;
        Ok(Node::Leaf(pairs))
    }

    /// Serializes to plain nested dictionaries with correct `Limits`.
    pub fn to_object(&self) -> Object {
        Object::Dictionary(Self::node_to_dict(&self.root, true))
    }

    fn node_to_dict(node: &Node<K>, is_root: bool) -> Dictionary {
        let mut dict = Dictionary::new();
        match node {
            Node::Leaf(pairs) => {
                let mut flat = Vec::with_capacity(pairs.len() * 2);
                for (key, value) in pairs {
                    flat.push(key.to_object());
                    flat.push(value.clone());
                }
                dict.set(K::PAIRS, flat);
            }
            Node::Interior(kids) => {
                let kid_dicts: Vec<Object> = kids
                    .iter()
                    .map(|kid| Object::Dictionary(Self::node_to_dict(kid, false)))
                    .collect();
                dict.set("Kids", kid_dicts);
            }
        }
        if !is_root {
            if let (Some(min), Some(max)) = (node.min_key(), node.max_key()) {
                dict.set("Limits", vec![min.to_object(), max.to_object()]);
            }
        }
        dict
    }

    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lookup(&self, key: &K) -> Option<&Object> {
        self.root.lookup(key)
    }

    /// Inserts `key`, returning the value it displaced, if any. Overfull
    /// nodes split on the way back up.
    pub fn insert(&mut self, key: K, value: Object) -> Option<Object> {
        let (displaced, split) = self.root.insert(key, value, self.capacity);
        if let Some(sibling) = split {
            let old_root = std::mem::replace(&mut self.root, Node::Interior(Vec::new()));
            self.root = Node::Interior(vec![old_root, sibling]);
        }
        displaced
    }

    /// Removes `key`, collapsing emptied nodes so no empty interior is
    /// left behind.
    pub fn remove(&mut self, key: &K) -> Option<Object> {
        let removed = self.root.remove(key);
        // Hoist a single-kid root; replace an emptied root by a leaf.
        loop {
            match &mut self.root {
                Node::Interior(kids) if kids.is_empty() => {
                    self.root = Node::Leaf(Vec::new());
                }
                Node::Interior(kids) if kids.len() == 1 => {
                    let only = kids.pop().expect("len checked");
                    self.root = only;
                    continue;
                }
                _ => {}
            }
            break;
        }
        removed
    }

    /// Key-ordered iteration over all pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &Object)> {
        let mut stack = vec![&self.root];
        let mut pairs: Vec<(&K, &Object)> = Vec::new();
        while let Some(node) = stack.pop() {
            match node {
                Node::Leaf(leaf) => pairs.extend(leaf.iter().map(|(k, v)| (k, v))),
                Node::Interior(kids) => stack.extend(kids.iter()),
            }
        }
        pairs.sort_by(|(a, _), (b, _)| a.cmp(b));
        pairs.into_iter()
    }
}

impl<K: TreeKey> Node<K> {
    fn len(&self) -> usize {
        match self {
            Node::Leaf(pairs) => pairs.len(),
            Node::Interior(kids) => kids.iter().map(Node::len).sum(),
        }
    }

    fn min_key(&self) -> Option<&K> {
        match self {
            Node::Leaf(pairs) => pairs.first().map(|(key, _)| key),
            Node::Interior(kids) => kids.first().and_then(Node::min_key),
        }
    }

    fn max_key(&self) -> Option<&K> {
        match self {
            Node::Leaf(pairs) => pairs.last().map(|(key, _)| key),
            Node::Interior(kids) => kids.last().and_then(Node::max_key),
        }
    }

    fn lookup(&self, key: &K) -> Option<&Object> {
        match self {
            Node::Leaf(pairs) => pairs
                .binary_search_by(|(candidate, _)| candidate.cmp(key))
                .ok()
                .map(|index| &pairs[index].1),
            Node::Interior(kids) => {
                for kid in kids {
                    if kid.max_key().is_some_and(|max| key <= max) {
                        return if kid.min_key().is_some_and(|min| min <= key) {
                            kid.lookup(key)
                        } else {
                            None
                        };
                    }
                }
                None
            }
        }
    }

    /// Returns the displaced value and, when this node split, the new
    /// right sibling.
    fn insert(&mut self, key: K, value: Object, capacity: usize) -> (Option<Object>, Option<Node<K>>) {
        match self {
            Node::Leaf(pairs) => {
                let displaced = match pairs.binary_search_by(|(candidate, _)| candidate.cmp(&key)) {
                    Ok(index) => Some(std::mem::replace(&mut pairs[index].1, value)),
                    Err(index) => {
                        pairs.insert(index, (key, value));
                        None
                    }
                };
                if pairs.len() > capacity {
                    let right = pairs.split_off(pairs.len() / 2);
                    return (displaced, Some(Node::Leaf(right)));
                }
                (displaced, None)
            }
            Node::Interior(kids) => {
                // A loaded tree may carry an empty interior; give it a
                // leaf to grow into.
                if kids.is_empty() {
                    kids.push(Node::Leaf(Vec::new()));
                }
                // Descend into the first kid whose range can take the
                // key; past the last range, the last kid grows.
                let position = kids
                    .iter()
                    .position(|kid| kid.max_key().is_some_and(|max| &key <= max))
                    .unwrap_or(kids.len() - 1);
                let (displaced, split) = kids[position].insert(key, value, capacity);
                if let Some(sibling) = split {
                    kids.insert(position + 1, sibling);
                }
                if kids.len() > capacity {
                    let right = kids.split_off(kids.len() / 2);
                    return (displaced, Some(Node::Interior(right)));
                }
                (displaced, None)
            }
        }
    }

    fn remove(&mut self, key: &K) -> Option<Object> {
        match self {
            Node::Leaf(pairs) => pairs
                .binary_search_by(|(candidate, _)| candidate.cmp(key))
                .ok()
                .map(|index| pairs.remove(index).1),
            Node::Interior(kids) => {
                let position = kids
                    .iter()
                    .position(|kid| kid.max_key().is_some_and(|max| key <= max))?;
                let removed = kids[position].remove(key);
                if kids[position].len() == 0 {
                    kids.remove(position);
                }
                removed
            }
        }
    }
}
