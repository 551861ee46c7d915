#![deny(unused_must_use)]

mod cmd;

use {
	btree::{Btree, PrintError},
	clap::Parser,
	cmd::Cmd,
	log::debug,
	rafile::{FileDev, Stats},
	recfile::Recf,
	rustyline::error::ReadlineError,
	std::{
		fs,
		io::{self, BufRead, BufReader},
		path::PathBuf,
		process::ExitCode,
	},
};

#[derive(clap::Parser)]
#[clap(version, about = "Shell for a B-tree indexed record store")]
struct Args {
	/// Script with one command per line; reads from the terminal if absent.
	script: Option<PathBuf>,

	/// Path of the B-tree index file (created fresh).
	#[clap(long, default_value = "btree.dat")]
	index: PathBuf,

	/// Path of the record file (created fresh).
	#[clap(long, default_value = "records.dat")]
	records: PathBuf,
}

struct Context {
	btree: Btree<FileDev>,
	recf: Recf<FileDev>,
}

fn main() -> ExitCode {
	env_logger::init();
	match run(Args::parse()) {
		Ok(code) => code,
		Err(e) => {
			eprintln!("ERROR: {}", e);
			ExitCode::FAILURE
		}
	}
}

fn run(args: Args) -> Result<ExitCode, Box<dyn std::error::Error>> {
	let mut ctx = Context {
		btree: Btree::new(FileDev::open(&args.index, true)?)?,
		recf: Recf::new(FileDev::open(&args.records, true)?)?,
	};

	let code = match &args.script {
		Some(path) => match fs::File::open(path) {
			Ok(script) => {
				run_script(&mut ctx, script)?;
				ExitCode::SUCCESS
			}
			Err(e) => {
				eprintln!("ERROR: Can't open file: {}", e);
				ExitCode::from(1)
			}
		},
		None => {
			run_interactive(&mut ctx)?;
			ExitCode::SUCCESS
		}
	};

	ctx.btree.close()?;
	ctx.recf.close()?;
	Ok(code)
}

fn run_interactive(ctx: &mut Context) -> Result<(), Box<dyn std::error::Error>> {
	let mut rl = rustyline::DefaultEditor::new()?;
	loop {
		match rl.readline("(btree) ") {
			Ok(line) => {
				if !line.is_empty() {
					rl.add_history_entry(&line)?;
				}
				execute_line(ctx, &line)?;
			}
			Err(ReadlineError::Eof | ReadlineError::Interrupted) => return Ok(()),
			Err(e) => return Err(e.into()),
		}
	}
}

fn run_script(ctx: &mut Context, script: fs::File) -> Result<(), Box<dyn std::error::Error>> {
	for line in BufReader::new(script).lines() {
		let line = line?;
		println!("(btree) {}", line);
		execute_line(ctx, &line)?;
	}
	Ok(())
}

fn execute_line(ctx: &mut Context, line: &str) -> io::Result<()> {
	let old_stats = total_stats(ctx);

	match cmd::parse(line) {
		Ok(None) => return Ok(()),
		Ok(Some(cmd)) => execute(ctx, cmd)?,
		Err(msg) => {
			eprintln!("ERROR: {}", msg);
			return Ok(());
		}
	}

	let Stats { n_reads, n_writes } = total_stats(ctx) - old_stats;
	println!("Reads: {}, writes: {}", n_reads, n_writes);
	Ok(())
}

fn total_stats(ctx: &Context) -> Stats {
	ctx.btree.stats() + ctx.recf.stats()
}

fn execute(ctx: &mut Context, cmd: Cmd) -> io::Result<()> {
	match cmd {
		Cmd::Get { key } => match ctx.btree.get(key)? {
			Some(idx) => {
				let record = ctx.recf.get(idx)?;
				println!("{} => {}", key, record);
			}
			None => eprintln!("ERROR: The key {} doesn't exist in the tree.", key),
		},
		Cmd::Set { key, record } => {
			// The tree's value is the record's slot index. Overwriting a key
			// frees the old record's slot, which the add below then reuses.
			if let Some(old_idx) = ctx.btree.get(key)? {
				ctx.recf.delete(old_idx)?;
			}
			let idx = ctx.recf.add(record)?;
			ctx.btree.set(key, idx)?;
			debug!("set {} -> record slot {}", key, idx);
		}
		Cmd::Print => {
			let stdout = io::stdout();
			ctx.btree.print(&mut stdout.lock()).map_err(flatten)?;
		}
		Cmd::List => {
			let mut mappings = Vec::new();
			ctx.btree.walk(|key, idx| mappings.push((key, idx)))?;
			for (key, idx) in mappings {
				let record = ctx.recf.get(idx)?;
				println!("{} => {}", key, record);
			}
		}
		Cmd::Delete => eprintln!("ERROR: delete isn't implemented."),
	}
	Ok(())
}

fn flatten(e: PrintError<io::Error>) -> io::Error {
	match e {
		PrintError::Dev(e) | PrintError::Io(e) => e,
	}
}
