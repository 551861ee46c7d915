use {
	crate::{
		node::{Item, Node, MAX_CHILDREN, MAX_KEYS, MIN_KEYS},
		Btree, Key, Ptr, Value, NIL,
	},
	arrayvec::ArrayVec,
	log::debug,
	rafile::{xassert, Dev},
};

// Tree height is logarithmic in the number of items, so this is enough for
// any realistic file size.
const MAX_DEPTH: usize = 32;

/// One step of the path recorded by the down pass: the up pass uses it to
/// reach parents and siblings without re-reading them.
struct PathEntry {
	ptr: Ptr,
	node: Node,
}

impl<D: Dev> Btree<D> {
	/// Associate `value` with `key`, overwriting any existing association.
	pub fn set(&mut self, key: Key, value: Value) -> Result<(), D::Error> {
		let new_item = Item { key, value };
		let mut path = ArrayVec::<PathEntry, MAX_DEPTH>::new();

		// Down pass: descend to the node that should hold the item, recording
		// the path.
		let mut ptr = self.superblock.root;
		loop {
			let mut node = self.read_node(ptr)?;
			let i = node.search(key);

			if node.items.get(i).is_some_and(|it| it.key == key) {
				// Exact key; set its associated value.
				node.items[i].value = value;
				return self.write_node(&node, ptr);
			}

			if node.is_leaf {
				path.push(PathEntry { ptr, node });
				let depth = path.len() - 1;
				return self.insert_up(new_item, NIL, i, &path, depth);
			}

			// keys[i - 1] < key < keys[i], so the item belongs in the i-th
			// child's subtree.
			let child = node.children[i];
			path.push(PathEntry { ptr, node });
			ptr = child;
		}
	}

	/// Up pass: insert `new_item` into the node at `path[depth]` on position
	/// `i_in_node`, recursing upwards if the node overflows.
	///
	/// `new_right_child` is `NIL` except when propagating from a split below.
	fn insert_up(
		&mut self,
		new_item: Item,
		new_right_child: Ptr,
		i_in_node: usize,
		path: &[PathEntry],
		depth: usize,
	) -> Result<(), D::Error> {
		let ptr = path[depth].ptr;
		let mut node = path[depth].node.clone();

		xassert!(1, i_in_node <= node.items.len());
		xassert!(1, (ptr == self.superblock.root) == (depth == 0));
		xassert!(1, node.is_leaf == (new_right_child == NIL));

		// If there's free space in the node, just insert the item.
		if node.items.len() < MAX_KEYS {
			node.items.insert(i_in_node, new_item);
			if !node.is_leaf {
				node.children.insert(i_in_node + 1, new_right_child);
			}
			return self.write_node(&node, ptr);
		}

		// The node is full. If it's not the root, try to compensate (move
		// some items to a sibling).
		let mut i_node_in_parent = None;
		if ptr != self.superblock.root {
			let parent = &path[depth - 1].node;
			let i = parent
				.children
				.iter()
				.position(|&c| c == ptr)
				.expect("node not among its parent's children");
			i_node_in_parent = Some(i);

			if self.try_compensate(&node, new_item, new_right_child, i_in_node, i, path, depth)? {
				return Ok(());
			}
		}

		// Can't compensate; split the node and push the separator up.
		let mut all_items = ArrayVec::<Item, { MAX_KEYS + 1 }>::new();
		all_items.extend(node.items.iter().copied());
		all_items.insert(i_in_node, new_item);

		let mut sibling = if node.is_leaf { Node::new_leaf() } else { Node::new_internal() };
		node.items.clear();
		node.items.extend(all_items[..MIN_KEYS].iter().copied());
		let separator = all_items[MIN_KEYS];
		sibling.items.extend(all_items[MIN_KEYS + 1..].iter().copied());

		if !node.is_leaf {
			let mut all_children = ArrayVec::<Ptr, { MAX_CHILDREN + 1 }>::new();
			all_children.extend(node.children.iter().copied());
			all_children.insert(i_in_node + 1, new_right_child);

			node.children.clear();
			node.children.extend(all_children[..MIN_KEYS + 1].iter().copied());
			sibling.children.extend(all_children[MIN_KEYS + 1..].iter().copied());
		}

		self.write_node(&node, ptr)?;
		let sibling_ptr = self.alloc_block()?;
		self.write_node(&sibling, sibling_ptr)?;
		debug!("split node {} into {} | {} | {}", ptr, ptr, separator.key, sibling_ptr);

		if let Some(i) = i_node_in_parent {
			self.insert_up(separator, sibling_ptr, i, path, depth - 1)
		} else {
			// We're splitting the root; the tree grows in height.
			let mut new_root = Node::new_internal();
			new_root.items.push(separator);
			new_root.children.push(ptr);
			new_root.children.push(sibling_ptr);

			self.superblock.root = self.alloc_block()?;
			debug!("new root {}", self.superblock.root);
			self.write_node(&new_root, self.superblock.root)
		}
	}

	/// Try to make room by redistributing with the left sibling first, then
	/// the right one. Returns whether the item was placed.
	fn try_compensate(
		&mut self,
		node: &Node,
		new_item: Item,
		new_right_child: Ptr,
		i_in_node: usize,
		i_node_in_parent: usize,
		path: &[PathEntry],
		depth: usize,
	) -> Result<bool, D::Error> {
		let node_ptr = path[depth].ptr;
		let parent_ptr = path[depth - 1].ptr;
		let mut parent = path[depth - 1].node.clone();

		if i_node_in_parent > 0 {
			let left_ptr = parent.children[i_node_in_parent - 1];
			let mut left = self.read_node(left_ptr)?;

			if left.items.len() < MAX_KEYS {
				let mut right = node.clone();
				compensate(
					&mut parent.items[i_node_in_parent - 1],
					&mut left,
					&mut right,
					new_item,
					new_right_child,
					false,
					i_in_node,
				);
				self.write_node(&parent, parent_ptr)?;
				self.write_node(&left, left_ptr)?;
				self.write_node(&right, node_ptr)?;
				return Ok(true);
			}
		}

		if i_node_in_parent < parent.items.len() {
			let right_ptr = parent.children[i_node_in_parent + 1];
			let mut right = self.read_node(right_ptr)?;

			if right.items.len() < MAX_KEYS {
				let mut left = node.clone();
				compensate(
					&mut parent.items[i_node_in_parent],
					&mut left,
					&mut right,
					new_item,
					new_right_child,
					true,
					i_in_node,
				);
				self.write_node(&parent, parent_ptr)?;
				self.write_node(&left, node_ptr)?;
				self.write_node(&right, right_ptr)?;
				return Ok(true);
			}
		}

		Ok(false)
	}
}

/// Redistribute the items of `left` and `right` (plus the separator between
/// them and the new item) evenly, updating the separator in the parent.
///
/// `left` and `right` may temporarily hold an invalid number of items; this
/// function leaves both valid.
fn compensate(
	separator: &mut Item,
	left: &mut Node,
	right: &mut Node,
	new_item: Item,
	new_right_child: Ptr,
	new_item_in_left: bool,
	i_new_item: usize,
) {
	xassert!(1, left.items.len() < MAX_KEYS || right.items.len() < MAX_KEYS);
	xassert!(1, left.is_leaf == right.is_leaf);
	xassert!(1, left.is_leaf == (new_right_child == NIL));
	xassert!(1, left.items.last().map_or(true, |it| it.key < separator.key));
	xassert!(1, right.items.first().map_or(true, |it| separator.key < it.key));

	// Collect the items of both nodes, the separator and the new item, in
	// order.
	let i_all = if new_item_in_left { i_new_item } else { left.items.len() + 1 + i_new_item };
	let mut all_items = ArrayVec::<Item, { 2 * MAX_KEYS + 2 }>::new();
	all_items.extend(left.items.iter().copied());
	all_items.push(*separator);
	all_items.extend(right.items.iter().copied());
	all_items.insert(i_all, new_item);

	// Same for the child pointers and new_right_child, which goes right of
	// the new item.
	let mut all_children = ArrayVec::<Ptr, { 2 * MAX_CHILDREN + 1 }>::new();
	if !left.is_leaf {
		let i_child_all = if new_item_in_left {
			i_new_item + 1
		} else {
			left.children.len() + i_new_item + 1
		};
		all_children.extend(left.children.iter().copied());
		all_children.extend(right.children.iter().copied());
		all_children.insert(i_child_all, new_right_child);
	}

	// Divide the items among the left node, the separator slot in the parent
	// and the right node.
	let n_left = (all_items.len() - 1) / 2;
	left.items.clear();
	left.items.extend(all_items[..n_left].iter().copied());
	*separator = all_items[n_left];
	right.items.clear();
	right.items.extend(all_items[n_left + 1..].iter().copied());

	if !left.is_leaf {
		left.children.clear();
		left.children.extend(all_children[..n_left + 1].iter().copied());
		right.children.clear();
		right.children.extend(all_children[n_left + 1..].iter().copied());
	}

	xassert!(2, left.valid(false) && right.valid(false));
}
