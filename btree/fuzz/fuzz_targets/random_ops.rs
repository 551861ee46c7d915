#![no_main]

use {
	arbitrary::Arbitrary,
	btree::Btree,
	libfuzzer_sys::fuzz_target,
	rafile::MemDev,
	std::collections::BTreeMap,
};

#[derive(Clone, Copy, Debug, Arbitrary)]
enum Op {
	Set { key: u32, value: u64 },
	Get { key: u32 },
	Walk,
	Reload,
}

fuzz_target!(|ops: Vec<Op>| {
	let mut tree = Btree::new(MemDev::new()).unwrap();
	let mut model = BTreeMap::new();

	for op in ops {
		match op {
			Op::Set { key, value } => {
				tree.set(key, value).unwrap();
				model.insert(key, value);
			}
			Op::Get { key } => {
				assert_eq!(tree.get(key).unwrap(), model.get(&key).copied());
			}
			Op::Walk => {
				let mut got = Vec::new();
				tree.walk(|k, v| got.push((k, v))).unwrap();
				assert_eq!(got, model.iter().map(|(&k, &v)| (k, v)).collect::<Vec<_>>());
			}
			Op::Reload => {
				let dev = tree.close().unwrap();
				tree = Btree::load(MemDev::from(dev.into_vec())).unwrap();
			}
		}
	}
});
