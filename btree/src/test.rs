use {
	crate::{
		node::{MAX_KEYS, MIN_KEYS},
		Btree, Key, Ptr, Value, NIL,
	},
	rafile::MemDev,
	rand::{rngs::StdRng, Rng, SeedableRng},
	std::collections::{BTreeMap, BTreeSet},
};

fn mktree() -> Btree<MemDev> {
	Btree::new(MemDev::new()).unwrap()
}

fn pairs(tree: &mut Btree<MemDev>) -> Vec<(Key, Value)> {
	let mut out = Vec::new();
	tree.walk(|k, v| out.push((k, v))).unwrap();
	out
}

impl Btree<MemDev> {
	/// Verify the shape of the whole tree and the allocator.
	fn check(&mut self) {
		let mut reachable = BTreeSet::new();
		let root = self.superblock.root;
		self.check_at(root, None, None, &mut reachable);

		// Free-list blocks and reachable node blocks are disjoint subsets of
		// [1, end).
		let mut free = self.superblock.free_list_head;
		let mut n_free = 0;
		while free != NIL {
			assert!((1..self.superblock.end).contains(&free));
			assert!(!reachable.contains(&free), "free block {} is reachable", free);
			n_free += 1;
			assert!(n_free < self.superblock.end, "free list cycle");
			free = self.read_free(free).unwrap();
		}
	}

	fn check_at(
		&mut self,
		ptr: Ptr,
		lo: Option<Key>,
		hi: Option<Key>,
		reachable: &mut BTreeSet<Ptr>,
	) {
		assert!((1..self.superblock.end).contains(&ptr));
		assert!(reachable.insert(ptr), "block {} reachable twice", ptr);

		let node = self.read_node(ptr).unwrap();
		let is_root = ptr == self.superblock.root;
		assert!(node.items.len() <= MAX_KEYS);
		assert!(is_root || node.items.len() >= MIN_KEYS);
		assert!(node.items.windows(2).all(|w| w[0].key < w[1].key));
		for it in &node.items {
			assert!(lo.map_or(true, |lo| lo < it.key));
			assert!(hi.map_or(true, |hi| it.key < hi));
		}

		if node.is_leaf {
			assert!(node.children.is_empty());
			return;
		}
		assert_eq!(node.children.len(), node.items.len() + 1);
		for i in 0..node.children.len() {
			let lo = if i == 0 { lo } else { Some(node.items[i - 1].key) };
			let hi = node.items.get(i).map(|it| it.key).or(hi);
			self.check_at(node.children[i], lo, hi, reachable);
		}
	}

	fn height(&mut self) -> usize {
		let mut h = 1;
		let mut ptr = self.superblock.root;
		loop {
			let node = self.read_node(ptr).unwrap();
			if node.is_leaf {
				return h;
			}
			h += 1;
			ptr = node.children[0];
		}
	}
}

#[test]
fn set_get_one() {
	let mut tree = mktree();
	tree.set(10, 100).unwrap();
	assert_eq!(tree.get(10).unwrap(), Some(100));
	assert_eq!(tree.height(), 1);
	assert_eq!(pairs(&mut tree), [(10, 100)]);
	tree.check();
}

#[test]
fn get_absent() {
	let mut tree = mktree();
	assert_eq!(tree.get(1).unwrap(), None);
	tree.set(10, 100).unwrap();
	assert_eq!(tree.get(9).unwrap(), None);
	assert_eq!(tree.get(11).unwrap(), None);
}

#[test]
fn overwrite_keeps_one_mapping() {
	let mut tree = mktree();
	tree.set(42, 1).unwrap();
	tree.set(42, 2).unwrap();
	assert_eq!(tree.get(42).unwrap(), Some(2));
	assert_eq!(pairs(&mut tree), [(42, 2)]);
	tree.check();
}

#[test]
fn fill_root_without_split() {
	let mut tree = mktree();
	for k in 0..MAX_KEYS as Key {
		tree.set(k, u64::from(k) * 10).unwrap();
	}
	assert_eq!(tree.height(), 1);
	tree.check();
}

#[test]
fn first_root_split() {
	let mut tree = mktree();
	for k in 0..=MAX_KEYS as Key {
		tree.set(k, u64::from(k) * 10).unwrap();
	}
	assert_eq!(tree.height(), 2);
	let expect = (0..=MAX_KEYS as Key).map(|k| (k, u64::from(k) * 10)).collect::<Vec<_>>();
	assert_eq!(pairs(&mut tree), expect);
	tree.check();
}

#[test]
fn compensate_absorbs_ascending_overflow() {
	let mut tree = mktree();
	// After the first root split the left child is half full; ascending
	// inserts land in the right child, which sheds items to the left sibling
	// before it resorts to splitting.
	let n = 2 * MAX_KEYS as Key;
	for k in 0..=n {
		tree.set(k, u64::from(k)).unwrap();
		tree.check();
	}
	assert_eq!(tree.height(), 2);
}

#[test]
fn compensate_absorbs_descending_overflow() {
	let mut tree = mktree();
	let n = 2 * MAX_KEYS as Key;
	for k in (0..=n).rev() {
		tree.set(k, u64::from(k)).unwrap();
		tree.check();
	}
	assert_eq!(tree.height(), 2);
	let expect = (0..=n).map(|k| (k, u64::from(k))).collect::<Vec<_>>();
	assert_eq!(pairs(&mut tree), expect);
}

#[test]
fn walk_sorts_permuted_inserts() {
	let mut tree = mktree();
	for k in [5, 3, 7, 1, 9, 2, 8, 4, 6] {
		tree.set(k, u64::from(k) * 10).unwrap();
	}
	let expect = (1..=9).map(|k| (k, u64::from(k) * 10)).collect::<Vec<_>>();
	assert_eq!(pairs(&mut tree), expect);
	tree.check();
}

#[test]
fn many_random_keys() {
	let mut tree = mktree();
	let mut reference = BTreeMap::new();
	let mut rng = StdRng::seed_from_u64(0xb7ee);

	for _ in 0..10_000 {
		let (k, v) = (rng.gen::<Key>(), rng.gen::<Value>());
		tree.set(k, v).unwrap();
		reference.insert(k, v);
	}
	tree.check();

	let got = pairs(&mut tree);
	assert!(got.windows(2).all(|w| w[0].0 < w[1].0));
	assert_eq!(got, reference.iter().map(|(&k, &v)| (k, v)).collect::<Vec<_>>());

	for (&k, &v) in &reference {
		assert_eq!(tree.get(k).unwrap(), Some(v));
	}
}

#[test]
fn random_overwrites_match_reference() {
	let mut tree = mktree();
	let mut reference = BTreeMap::new();
	let mut rng = StdRng::seed_from_u64(7);

	// A small key space forces plenty of overwrites.
	for _ in 0..2_000 {
		let (k, v) = (rng.gen_range(0..200), rng.gen::<Value>());
		tree.set(k, v).unwrap();
		reference.insert(k, v);
	}
	tree.check();
	assert_eq!(pairs(&mut tree), reference.into_iter().collect::<Vec<_>>());
}

#[test]
fn deep_tree() {
	let mut tree = mktree();
	for k in 0..20_000 {
		tree.set(k, u64::from(k)).unwrap();
	}
	assert!(tree.height() >= 3);
	tree.check();
	for k in (0..20_000).step_by(997) {
		assert_eq!(tree.get(k).unwrap(), Some(u64::from(k)));
	}
}

#[test]
fn persists_across_reopen() {
	let mut tree = mktree();
	for k in 0..1_000 {
		tree.set(k, u64::from(k) * 2).unwrap();
	}
	let dev = tree.close().unwrap();

	let mut tree = Btree::load(MemDev::from(dev.into_vec())).unwrap();
	tree.check();
	for k in 0..1_000 {
		assert_eq!(tree.get(k).unwrap(), Some(u64::from(k) * 2));
	}
}

#[test]
fn load_rejects_garbage() {
	assert!(Btree::load(MemDev::new()).is_err());
	assert!(Btree::load(MemDev::from(vec![0xff; 2 * crate::BLOCK_SIZE])).is_err());
}

#[test]
fn block_allocator_reuses_freed_blocks() {
	let mut tree = mktree();
	let a = tree.alloc_block().unwrap();
	let b = tree.alloc_block().unwrap();
	assert_ne!(a, b);
	tree.dealloc_block(a).unwrap();
	tree.dealloc_block(b).unwrap();
	// LIFO reuse.
	assert_eq!(tree.alloc_block().unwrap(), b);
	assert_eq!(tree.alloc_block().unwrap(), a);
	assert_eq!(tree.alloc_block().unwrap(), tree.superblock.end - 1);
}

#[test]
fn print_dumps_all_items() {
	let mut tree = mktree();
	for k in 0..100 {
		tree.set(k, u64::from(k) + 1).unwrap();
	}
	let mut out = Vec::new();
	tree.print(&mut out).unwrap();
	let out = String::from_utf8(out).unwrap();
	assert!(out.starts_with("Node "));
	for k in [0, 37, 99] {
		assert!(out.contains(&format!("{} => {}", k, k + 1)));
	}
}

#[test]
fn counters_only_grow() {
	let mut tree = mktree();
	let mut last = tree.stats();
	for k in 0..100 {
		tree.set(k, 0).unwrap();
		let now = tree.stats();
		assert!(now.n_reads >= last.n_reads && now.n_writes >= last.n_writes);
		last = now;
	}
}
