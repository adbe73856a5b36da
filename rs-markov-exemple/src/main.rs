use std::path::PathBuf;

use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;

use rs_markov_core::model::generator::generate_many;
use rs_markov_core::{Constraints, CorpusConfig, CorpusModel, StartState};

/// Trains a corpus from a text file and prints generated sentences.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Text corpus, one message per line. A `.bin` snapshot is cached next to it.
	#[arg(short, long, default_value = "./data/general.txt")]
	input: PathBuf,

	/// Chain order.
	#[arg(short, long, default_value = "2")]
	order: usize,

	/// Number of sentences to generate.
	#[arg(short, long, default_value = "10")]
	count: usize,

	/// RNG seed for reproducible output.
	#[arg(short, long)]
	seed: Option<u64>,

	/// Words the sentences must start with, or `random` for a random context.
	#[arg(long)]
	start: Option<String>,

	/// Word every sentence must contain.
	#[arg(long)]
	contains: Option<String>,

	/// Attempts per sentence before giving up.
	#[arg(long, default_value = "100")]
	max_attempts: usize,

	/// Maximum tokens per sentence.
	#[arg(long, default_value = "64")]
	max_tokens: usize,

	/// Minimum tokens per sentence.
	#[arg(long, default_value = "1")]
	min_tokens: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
	let args = Args::parse();

	// Loads the .bin snapshot if present, trains from the text otherwise
	let config = CorpusConfig::new(args.order)?;
	let model = CorpusModel::from_text_file(&args.input, &config)?;
	println!(
		"Corpus: {} sentences, {} contexts",
		model.sentence_count(),
		model.table().len()
	);

	let mut constraints = Constraints {
		max_attempts: args.max_attempts,
		..Default::default()
	};
	constraints.set_bounds(args.min_tokens, args.max_tokens)?;
	constraints.start = match args.start.as_deref() {
		None => StartState::Sentinel,
		Some(s) if s.eq_ignore_ascii_case("random") => StartState::Random,
		Some(words) => StartState::Words(words.to_owned()),
	};
	constraints.must_contain = args.contains;
	constraints.validate()?;

	let mut rng = match args.seed {
		Some(seed) => StdRng::seed_from_u64(seed),
		None => StdRng::from_rng(&mut rand::rng()),
	};

	let sentences = generate_many(&model, &constraints, args.count, &mut rng);
	if sentences.len() < args.count {
		log::warn!(
			"Only {} of {} sentences satisfied the constraints",
			sentences.len(),
			args.count
		);
	}
	for (i, sentence) in sentences.iter().enumerate() {
		println!("Generated sentence {}: {}", i + 1, sentence);
	}

	Ok(())
}
