//! A cursor into the table's B+-tree: a (page, cell) position that can be
//! advanced across leaf boundaries to scan the whole table in key order.
use crate::errors::Error;
use crate::storage::btree::NodeType;
use crate::storage::table::Table;

pub struct Cursor<'a> {
    table: &'a mut Table,
    pub page_num: u32,
    pub cell_num: u32,
    pub end_of_table: bool,
}

impl<'a> Cursor<'a> {
    /// Positions at the first row in key order, descending from the root
    /// through `child(0)` at every internal node.
    pub fn start(table: &'a mut Table) -> Result<Self, Error> {
        let mut page_num = table.root_page_num;
        loop {
            let node = table.get_node(page_num)?;
            match node.node_type() {
                NodeType::Leaf => {
                    let end_of_table = node.num_cells() == 0;
                    return Ok(Cursor {
                        table,
                        page_num,
                        cell_num: 0,
                        end_of_table,
                    });
                }
                NodeType::Internal => page_num = node.child(0),
            }
        }
    }

    /// Descends from the root to the leaf that would contain `key`, then
    /// binary-searches that leaf for `key`'s cell (or the cell it would
    /// occupy if absent).
    pub fn find(table: &'a mut Table, key: u32) -> Result<Self, Error> {
        let mut page_num = table.root_page_num;
        loop {
            let node = table.get_node(page_num)?;
            match node.node_type() {
                NodeType::Internal => {
                    page_num = node.child(node.internal_find_child_index(key));
                }
                NodeType::Leaf => {
                    let mut min = 0u32;
                    let mut max = node.num_cells();
                    while min != max {
                        let mid = (min + max) / 2;
                        let key_at_mid = node.leaf_key(mid);
                        if key_at_mid == key {
                            min = mid;
                            break;
                        }
                        if key < key_at_mid {
                            max = mid;
                        } else {
                            min = mid + 1;
                        }
                    }
                    return Ok(Cursor {
                        table,
                        page_num,
                        cell_num: min,
                        end_of_table: false,
                    });
                }
            }
        }
    }

    pub fn leaf_value(&mut self) -> Result<Vec<u8>, Error> {
        let node = self.table.get_node(self.page_num)?;
        Ok(node.leaf_value(self.cell_num).to_vec())
    }

    /// Moves to the next cell, following `next_leaf` across page boundaries.
    /// Sets `end_of_table` once a leaf with no further sibling is exhausted.
    pub fn advance(&mut self) -> Result<(), Error> {
        let node = self.table.get_node(self.page_num)?;
        self.cell_num += 1;
        if self.cell_num >= node.num_cells() {
            let next = node.next_leaf();
            if next == 0 {
                self.end_of_table = true;
            } else {
                self.page_num = next;
                self.cell_num = 0;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::row::Row;
    use tempfile::NamedTempFile;

    #[test]
    fn scans_rows_in_key_order_after_inserts() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::open(tmp.path()).unwrap();
        for id in [5u32, 1, 3] {
            table
                .insert(Row::new(id, "user", "user@example.com").unwrap())
                .unwrap();
        }

        let mut seen = Vec::new();
        let mut cursor = Cursor::start(&mut table).unwrap();
        while !cursor.end_of_table {
            let bytes = cursor.leaf_value().unwrap();
            seen.push(Row::deserialize(&bytes).id);
            cursor.advance().unwrap();
        }
        assert_eq!(seen, vec![1, 3, 5]);
    }

    #[test]
    fn find_locates_existing_key() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::open(tmp.path()).unwrap();
        table
            .insert(Row::new(7, "user", "user@example.com").unwrap())
            .unwrap();

        let mut cursor = Cursor::find(&mut table, 7).unwrap();
        let bytes = cursor.leaf_value().unwrap();
        assert_eq!(Row::deserialize(&bytes).id, 7);
    }
}
