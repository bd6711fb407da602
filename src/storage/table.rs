//! The single table: a B+-tree of rows keyed by `id`, backed by the pager.
//!
//! Page 0 is always the tree root. Insertion descends to the owning leaf,
//! inserts in sorted order, and splits leaves (and, transitively, internal
//! nodes) when they overflow, following the classic B+-tree algorithm: a
//! split node keeps its left half in place and moves its right half to a
//! freshly allocated page, then the new page is registered with the parent
//! (or a fresh root is created, if the node that split had none).
use std::path::Path;

use tracing::{debug, trace};

use crate::errors::Error;
use crate::pager::{Pager, PAGE_SIZE, TABLE_MAX_PAGES};
use crate::storage::btree::{
    Node, NodeType, COMMON_NODE_HEADER_SIZE, INTERNAL_NODE_CELL_SIZE, INTERNAL_NODE_MAX_CELLS,
    LEAF_NODE_AVAILABLE_CELL_SPACE, LEAF_NODE_CELL_SIZE, LEAF_NODE_HEADER_SIZE,
    LEAF_NODE_LEFT_SPLIT_COUNT, LEAF_NODE_MAX_CELLS, LEAF_NODE_RIGHT_SPLIT_COUNT,
};
use crate::storage::cursor::Cursor;
use crate::storage::row::{Row, ROW_SIZE};

pub struct Table {
    pub(crate) pager: Pager,
    pub root_page_num: u32,
}

impl Table {
    /// Opens the database file at `path`, initializing page 0 as an empty
    /// leaf root if the file is new.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let mut pager = Pager::open(path)?;
        if pager.num_pages == 0 {
            let mut root = Node::from_bytes(pager.get(0)?);
            root.initialize_leaf();
            root.set_is_root(true);
            pager.get(0)?.copy_from_slice(&root.data);
        }
        Ok(Table {
            pager,
            root_page_num: 0,
        })
    }

    pub fn close(self) -> Result<(), Error> {
        self.pager.close()
    }

    pub(crate) fn get_node(&mut self, page_num: u32) -> Result<Node, Error> {
        Ok(Node::from_bytes(self.pager.get(page_num)?))
    }

    fn put_node(&mut self, page_num: u32, node: &Node) -> Result<(), Error> {
        self.pager.get(page_num)?.copy_from_slice(&node.data);
        Ok(())
    }

    /// The true maximum key reachable under the node at `page_num`: for a
    /// leaf, its own last cell's key; for an internal node, the same
    /// question asked of its `right_child`, since the right child's subtree
    /// holds every key larger than this node's own cells.
    fn node_max_key(&mut self, page_num: u32) -> Result<u32, Error> {
        let node = self.get_node(page_num)?;
        match node.node_type() {
            NodeType::Leaf => node.own_max_key(),
            NodeType::Internal => self.node_max_key(node.right_child()),
        }
    }

    /// Materializes a fresh zeroed page and returns its number, or a fatal
    /// error if the table has reached its page-count ceiling.
    fn new_page_num(&mut self) -> Result<u32, Error> {
        let page_num = self.pager.num_pages;
        if page_num as usize >= TABLE_MAX_PAGES {
            return Err(Error::Storage("database full".into()));
        }
        self.pager.get(page_num)?;
        Ok(page_num)
    }

    /// Descends from the root to the leaf that should hold `key`, returning
    /// its page, the cell index `key` occupies (or would occupy), and
    /// whether it is already present.
    fn find_leaf(&mut self, key: u32) -> Result<(u32, u32, bool), Error> {
        let mut page_num = self.root_page_num;
        loop {
            let node = self.get_node(page_num)?;
            match node.node_type() {
                NodeType::Internal => {
                    page_num = node.child(node.internal_find_child_index(key));
                }
                NodeType::Leaf => {
                    let mut min = 0u32;
                    let mut max = node.num_cells();
                    let mut found = false;
                    while min != max {
                        let mid = (min + max) / 2;
                        let key_at_mid = node.leaf_key(mid);
                        if key_at_mid == key {
                            min = mid;
                            found = true;
                            break;
                        }
                        if key < key_at_mid {
                            max = mid;
                        } else {
                            min = mid + 1;
                        }
                    }
                    return Ok((page_num, min, found));
                }
            }
        }
    }

    pub fn insert(&mut self, row: Row) -> Result<(), Error> {
        let key = row.id;
        let (page_num, cell_num, found) = self.find_leaf(key)?;
        if found {
            return Err(Error::Duplicate(key));
        }
        self.leaf_insert(page_num, cell_num, &row)
    }

    fn leaf_insert(&mut self, page_num: u32, cell_num: u32, row: &Row) -> Result<(), Error> {
        let mut node = self.get_node(page_num)?;
        let num_cells = node.num_cells();
        if num_cells as usize >= LEAF_NODE_MAX_CELLS {
            return self.leaf_split_and_insert(page_num, cell_num, row);
        }

        if cell_num < num_cells {
            for i in (cell_num + 1..=num_cells).rev() {
                let cell = node.leaf_cell(i - 1).to_vec();
                node.set_leaf_cell(i, &cell);
            }
        }

        let mut row_buf = [0u8; ROW_SIZE];
        row.serialize(&mut row_buf);
        node.set_num_cells(num_cells + 1);
        node.set_leaf_key(cell_num, row.id);
        node.set_leaf_value(cell_num, &row_buf);
        trace!(page_num, cell_num, "Inserted leaf cell");
        self.put_node(page_num, &node)
    }

    fn leaf_split_and_insert(&mut self, page_num: u32, cell_num: u32, row: &Row) -> Result<(), Error> {
        let old_node = self.get_node(page_num)?;
        let old_is_root = old_node.is_root();
        let old_parent = old_node.parent();

        let mut row_buf = [0u8; ROW_SIZE];
        row.serialize(&mut row_buf);
        let mut new_cell = [0u8; LEAF_NODE_CELL_SIZE];
        new_cell[..4].copy_from_slice(&row.id.to_ne_bytes());
        new_cell[4..].copy_from_slice(&row_buf);

        let mut all_cells: Vec<[u8; LEAF_NODE_CELL_SIZE]> = Vec::with_capacity(LEAF_NODE_MAX_CELLS + 1);
        for i in 0..=LEAF_NODE_MAX_CELLS as u32 {
            if i == cell_num {
                all_cells.push(new_cell);
            }
            if i < LEAF_NODE_MAX_CELLS as u32 {
                let mut cell = [0u8; LEAF_NODE_CELL_SIZE];
                cell.copy_from_slice(old_node.leaf_cell(i));
                all_cells.push(cell);
            }
        }

        let new_page_num = self.new_page_num()?;
        let mut left = old_node;
        let mut right = Node::from_bytes(&[0u8; PAGE_SIZE]);
        right.initialize_leaf();

        left.set_num_cells(LEAF_NODE_LEFT_SPLIT_COUNT as u32);
        for (i, cell) in all_cells[..LEAF_NODE_LEFT_SPLIT_COUNT].iter().enumerate() {
            left.set_leaf_cell(i as u32, cell);
        }
        right.set_num_cells(LEAF_NODE_RIGHT_SPLIT_COUNT as u32);
        for (i, cell) in all_cells[LEAF_NODE_LEFT_SPLIT_COUNT..].iter().enumerate() {
            right.set_leaf_cell(i as u32, cell);
        }

        right.set_next_leaf(left.next_leaf());
        left.set_next_leaf(new_page_num);
        right.set_parent(old_parent);

        self.put_node(page_num, &left)?;
        self.put_node(new_page_num, &right)?;
        debug!(page_num, new_page_num, "Split leaf node");

        if old_is_root {
            self.create_new_root(new_page_num)
        } else {
            self.internal_insert(old_parent, new_page_num)
        }
    }

    /// Replaces the root with a fresh internal node whose children are a
    /// copy of the current root (moved to a new page) and `right_child_page_num`.
    fn create_new_root(&mut self, right_child_page_num: u32) -> Result<(), Error> {
        let root_page_num = self.root_page_num;
        let root = self.get_node(root_page_num)?;

        let left_child_page_num = self.new_page_num()?;
        let mut left_child = root;
        left_child.set_is_root(false);
        self.put_node(left_child_page_num, &left_child)?;

        let left_max = self.node_max_key(left_child_page_num)?;

        let mut new_root = Node::from_bytes(&[0u8; PAGE_SIZE]);
        new_root.initialize_internal();
        new_root.set_is_root(true);
        new_root.set_num_keys(1);
        new_root.set_child(0, left_child_page_num);
        new_root.set_internal_key(0, left_max);
        new_root.set_right_child(right_child_page_num);
        self.put_node(root_page_num, &new_root)?;

        let mut left_child = self.get_node(left_child_page_num)?;
        left_child.set_parent(root_page_num);
        self.put_node(left_child_page_num, &left_child)?;

        let mut right_child = self.get_node(right_child_page_num)?;
        right_child.set_parent(root_page_num);
        self.put_node(right_child_page_num, &right_child)?;

        debug!(root_page_num, left_child_page_num, right_child_page_num, "Created new root");
        Ok(())
    }

    /// Registers `child_page_num` as a new child of the internal node at
    /// `parent_page_num`, splitting it first if it is already full.
    fn internal_insert(&mut self, parent_page_num: u32, child_page_num: u32) -> Result<(), Error> {
        let child_max_key = self.node_max_key(child_page_num)?;
        let mut parent = self.get_node(parent_page_num)?;
        let index = parent.internal_find_child_index(child_max_key);
        let original_num_keys = parent.num_keys();

        if original_num_keys as usize >= INTERNAL_NODE_MAX_CELLS {
            return self.internal_split_and_insert(parent_page_num, child_page_num);
        }

        let right_child_page_num = parent.right_child();
        let right_child_max = self.node_max_key(right_child_page_num)?;

        if child_max_key > right_child_max {
            parent.set_child(original_num_keys, right_child_page_num);
            parent.set_internal_key(original_num_keys, right_child_max);
            parent.set_right_child(child_page_num);
        } else {
            for i in (index + 1..=original_num_keys).rev() {
                let (c, k) = parent.internal_cell(i - 1);
                parent.set_internal_cell(i, c, k);
            }
            parent.set_child(index, child_page_num);
            parent.set_internal_key(index, child_max_key);
        }
        parent.set_num_keys(original_num_keys + 1);
        self.put_node(parent_page_num, &parent)?;

        let mut child = self.get_node(child_page_num)?;
        child.set_parent(parent_page_num);
        self.put_node(child_page_num, &child)
    }

    /// Splits a full internal node, moving half its children to a new
    /// internal node and registering the new node with the grandparent (or
    /// creating a new root, if the splitting node had none).
    fn internal_split_and_insert(&mut self, parent_page_num: u32, child_page_num: u32) -> Result<(), Error> {
        let child_max_key = self.node_max_key(child_page_num)?;
        let old_max = self.node_max_key(parent_page_num)?;

        let old_node = self.get_node(parent_page_num)?;
        let old_is_root = old_node.is_root();
        let old_parent = old_node.parent();
        let num_keys = old_node.num_keys();

        let mut entries: Vec<(u32, u32)> = Vec::with_capacity(num_keys as usize + 2);
        for i in 0..num_keys {
            entries.push(old_node.internal_cell(i));
        }
        entries.push((old_node.right_child(), old_max));

        let pos = entries
            .iter()
            .position(|&(_, k)| child_max_key < k)
            .unwrap_or(entries.len());
        entries.insert(pos, (child_page_num, child_max_key));

        let total = entries.len();
        let left_count = total / 2;

        let new_page_num = self.new_page_num()?;

        let mut left = Node::from_bytes(&[0u8; PAGE_SIZE]);
        left.initialize_internal();
        left.set_parent(old_parent);
        for (i, &(c, k)) in entries[..left_count - 1].iter().enumerate() {
            left.set_internal_cell(i as u32, c, k);
        }
        left.set_num_keys((left_count - 1) as u32);
        left.set_right_child(entries[left_count - 1].0);

        let mut right = Node::from_bytes(&[0u8; PAGE_SIZE]);
        right.initialize_internal();
        right.set_parent(old_parent);
        for (i, &(c, k)) in entries[left_count..total - 1].iter().enumerate() {
            right.set_internal_cell(i as u32, c, k);
        }
        right.set_num_keys((total - left_count - 1) as u32);
        right.set_right_child(entries[total - 1].0);

        let left_max = self.node_max_key(entries[left_count - 1].0)?;

        if old_is_root {
            self.put_node(parent_page_num, &left)?;
            self.put_node(new_page_num, &right)?;
            self.create_new_root(new_page_num)?;
            let root = self.get_node(self.root_page_num)?;
            let left_child_page_num = root.child(0);
            self.reparent_children(&entries[..left_count], left_child_page_num)?;
            self.reparent_children(&entries[left_count..], new_page_num)?;
        } else {
            self.put_node(parent_page_num, &left)?;
            self.put_node(new_page_num, &right)?;
            self.reparent_children(&entries[..left_count], parent_page_num)?;
            self.reparent_children(&entries[left_count..], new_page_num)?;

            let mut parent = self.get_node(old_parent)?;
            parent.update_internal_key(old_max, left_max);
            self.put_node(old_parent, &parent)?;
            self.internal_insert(old_parent, new_page_num)?;
        }
        debug!(parent_page_num, new_page_num, "Split internal node");
        Ok(())
    }

    fn reparent_children(&mut self, entries: &[(u32, u32)], new_parent: u32) -> Result<(), Error> {
        for &(page_num, _) in entries {
            let mut node = self.get_node(page_num)?;
            node.set_parent(new_parent);
            self.put_node(page_num, &node)?;
        }
        Ok(())
    }

    pub fn select_all(&mut self) -> Result<Vec<Row>, Error> {
        let mut rows = Vec::new();
        let mut cursor = Cursor::start(self)?;
        while !cursor.end_of_table {
            let bytes = cursor.leaf_value()?;
            rows.push(Row::deserialize(&bytes));
            cursor.advance()?;
        }
        Ok(rows)
    }

    pub fn print_btree(&mut self) -> Result<String, Error> {
        self.print_tree(self.root_page_num, 0)
    }

    fn print_tree(&mut self, page_num: u32, indentation: usize) -> Result<String, Error> {
        let node = self.get_node(page_num)?;
        let pad = "  ".repeat(indentation);
        let mut out = String::new();
        match node.node_type() {
            NodeType::Leaf => {
                out.push_str(&format!("{pad}- leaf (size {})\n", node.num_cells()));
                for i in 0..node.num_cells() {
                    out.push_str(&format!("{pad}  - {}\n", node.leaf_key(i)));
                }
            }
            NodeType::Internal => {
                out.push_str(&format!("{pad}- internal (size {})\n", node.num_keys()));
                for i in 0..node.num_keys() {
                    out.push_str(&self.print_tree(node.child(i), indentation + 1)?);
                    out.push_str(&format!("{pad}  - key {}\n", node.internal_key(i)));
                }
                out.push_str(&self.print_tree(node.right_child(), indentation + 1)?);
            }
        }
        Ok(out)
    }

    pub fn print_constants() -> String {
        format!(
            "Constants:\n\
             ROW_SIZE: {ROW_SIZE}\n\
             COMMON_NODE_HEADER_SIZE: {COMMON_NODE_HEADER_SIZE}\n\
             LEAF_NODE_HEADER_SIZE: {LEAF_NODE_HEADER_SIZE}\n\
             LEAF_NODE_CELL_SIZE: {LEAF_NODE_CELL_SIZE}\n\
             LEAF_NODE_AVAILABLE_CELL_SPACE: {LEAF_NODE_AVAILABLE_CELL_SPACE}\n\
             LEAF_NODE_MAX_CELLS: {LEAF_NODE_MAX_CELLS}\n\
             INTERNAL_NODE_CELL_SIZE: {INTERNAL_NODE_CELL_SIZE}\n\
             INTERNAL_NODE_MAX_CELLS: {INTERNAL_NODE_MAX_CELLS}\n"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn row(id: u32) -> Row {
        Row::new(id, "user", "user@example.com").unwrap()
    }

    #[test]
    fn inserts_and_selects_in_sorted_order() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::open(tmp.path()).unwrap();
        for id in [3u32, 1, 2] {
            table.insert(row(id)).unwrap();
        }
        let rows = table.select_all().unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn rejects_duplicate_keys() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::open(tmp.path()).unwrap();
        table.insert(row(1)).unwrap();
        let err = table.insert(row(1)).unwrap_err();
        assert!(matches!(err, Error::Duplicate(1)));
    }

    #[test]
    fn splits_leaf_once_max_cells_exceeded() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::open(tmp.path()).unwrap();
        for id in 0..(LEAF_NODE_MAX_CELLS as u32 + 1) {
            table.insert(row(id)).unwrap();
        }
        let root = table.get_node(0).unwrap();
        assert_eq!(root.node_type(), NodeType::Internal);
        let rows = table.select_all().unwrap();
        assert_eq!(rows.len(), LEAF_NODE_MAX_CELLS + 1);
    }

    #[test]
    fn survives_enough_inserts_to_split_internal_nodes() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::open(tmp.path()).unwrap();
        for id in 0..30u32 {
            table.insert(row(id)).unwrap();
        }
        let rows = table.select_all().unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), (0..30).collect::<Vec<_>>());
    }

    /// Recursively checks that every internal cell's stored key equals the
    /// true maximum key reachable under its child subtree (spec.md §3/§8
    /// item 5), including cells whose child is itself an internal node.
    fn assert_separators_match_subtree_max(table: &mut Table, page_num: u32) {
        let node = table.get_node(page_num).unwrap();
        if node.node_type() != NodeType::Internal {
            return;
        }
        for i in 0..node.num_keys() {
            let child_page_num = node.child(i);
            let actual_max = table.node_max_key(child_page_num).unwrap();
            assert_eq!(
                node.internal_key(i),
                actual_max,
                "cell {i} on page {page_num} claims max key {} but subtree under page {child_page_num} actually maxes out at {actual_max}",
                node.internal_key(i),
            );
            assert_separators_match_subtree_max(table, child_page_num);
        }
        assert_separators_match_subtree_max(table, node.right_child());
    }

    #[test]
    fn maintains_separator_invariant_through_a_second_level_internal_split() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::open(tmp.path()).unwrap();
        // Enough sequential inserts to push the root's internal node past
        // INTERNAL_NODE_MAX_CELLS, forcing it to split and grow a third
        // tree level (root -> internal -> internal -> leaf).
        for id in 0..50u32 {
            table.insert(row(id)).unwrap();
        }

        let root = table.get_node(table.root_page_num).unwrap();
        assert_eq!(root.node_type(), NodeType::Internal);

        let rows = table.select_all().unwrap();
        assert_eq!(
            rows.iter().map(|r| r.id).collect::<Vec<_>>(),
            (0..50).collect::<Vec<_>>()
        );

        assert_separators_match_subtree_max(&mut table, table.root_page_num);
    }

    #[test]
    fn reopens_and_retains_rows_across_close() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        {
            let mut table = Table::open(&path).unwrap();
            for id in 0..20u32 {
                table.insert(row(id)).unwrap();
            }
            table.close().unwrap();
        }
        let mut table = Table::open(&path).unwrap();
        let rows = table.select_all().unwrap();
        assert_eq!(rows.len(), 20);
    }
}
