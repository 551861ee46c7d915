use {
	btree::Key,
	recfile::Record,
};

#[derive(Debug, PartialEq, Eq)]
pub enum Cmd {
	Get { key: Key },
	Set { key: Key, record: Record },
	Print,
	List,
	Delete,
}

/// Split a line into a command. `Ok(None)` means the line was blank.
pub fn parse(line: &str) -> Result<Option<Cmd>, String> {
	let tokens = line.split_whitespace().collect::<Vec<_>>();
	let Some((&cmd, args)) = tokens.split_first() else {
		return Ok(None);
	};

	let cmd = match (cmd, args) {
		("get", [key]) => Cmd::Get { key: parse_key(key)? },
		("get", _) => return Err("invalid syntax. Use: get <key>".into()),
		("set", [key, record]) => Cmd::Set { key: parse_key(key)?, record: parse_record(record)? },
		("set", _) => return Err("invalid syntax. Use: set <key> <record>".into()),
		("print", []) => Cmd::Print,
		("print", _) => return Err("invalid syntax. Use: print".into()),
		("list", []) => Cmd::List,
		("list", _) => return Err("invalid syntax. Use: list".into()),
		("delete", _) => Cmd::Delete,
		_ => return Err(format!("Unknown command: {}", cmd)),
	};
	Ok(Some(cmd))
}

fn parse_key(token: &str) -> Result<Key, String> {
	token
		.parse()
		.map_err(|_| "The key must be a positive integer.".into())
}

fn parse_record(token: &str) -> Result<Record, String> {
	token
		.parse()
		.map_err(|_| "The record must be a positive integer.".into())
}
