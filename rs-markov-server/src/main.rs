use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpResponse, HttpServer, Responder, get, post, put, web};
use clap::Parser;
use parking_lot::RwLock;
use serde::Deserialize;

use rs_markov_core::io::{build_output_path, get_filename, list_files, normalize_folder};
use rs_markov_core::{Constraints, CorpusConfig, CorpusModel, CorpusRegistry, StartState};

/// Answer sent when no sentence could be generated.
const FALLBACK_MESSAGE: &str = "My Markov chain isn't working properly!";

/// HTTP host for Markov corpus models.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Address to bind.
	#[arg(long, env = "MARKOV_BIND", default_value = "127.0.0.1")]
	bind: String,

	/// Port to listen on.
	#[arg(long, env = "MARKOV_PORT", default_value = "5000")]
	port: u16,

	/// Directory holding `<name>.txt` corpora and `<name>.bin` snapshots.
	#[arg(long, env = "MARKOV_DATA_DIR", default_value = "./data")]
	data_dir: String,

	/// Chain order of every source.
	#[arg(long, env = "MARKOV_ORDER", default_value = "2")]
	order: usize,

	/// Generated answers are cut to this many characters.
	#[arg(long, env = "MARKOV_MAX_CHARS", default_value = "1024")]
	max_chars: usize,

	/// Largest `max_attempts` a request may ask for.
	#[arg(long, env = "MARKOV_MAX_ATTEMPTS", default_value = "100")]
	max_attempts: usize,

	/// Largest `max_tokens` a request may ask for.
	#[arg(long, env = "MARKOV_MAX_TOKENS", default_value = "256")]
	max_tokens: usize,

	/// Corpora to load at startup (comma separated).
	#[arg(long, env = "MARKOV_SOURCES", value_delimiter = ',')]
	sources: Vec<String>,

	/// Accept cross-origin requests from anywhere.
	#[arg(long, env = "MARKOV_PERMISSIVE_CORS", default_value = "false")]
	permissive_cors: bool,
}

/// Struct representing query parameters for the `/v1/generate` endpoint
#[derive(Deserialize)]
struct GenerateParams {
	source: Option<String>,
	max_attempts: Option<usize>,
	max_tokens: Option<usize>,
	min_tokens: Option<usize>,
	seed: Option<String>, // none, random or custom(str)
	contains: Option<String>,
}

#[derive(Deserialize)]
struct SourceQuery {
	source: Option<String>,
}

#[derive(Deserialize)]
struct ModelQuery {
	names: Option<String>,
}

/// Upper bounds on what a single request may cost.
#[derive(Clone, Copy, Debug)]
struct Limits {
	max_attempts: usize,
	max_tokens: usize,
	max_chars: usize,
}

/// Server state.
///
/// The registry is copy-on-write: generation clones the `Arc` and releases
/// the lock before walking, writers clone the registry only while a
/// generation still holds the previous version.
struct SharedData {
	registry: RwLock<Arc<CorpusRegistry>>,
	data_dir: PathBuf,
	limits: Limits,
}

impl SharedData {
	fn new(config: CorpusConfig, data_dir: PathBuf, limits: Limits) -> Self {
		Self {
			registry: RwLock::new(Arc::new(CorpusRegistry::new(config))),
			data_dir,
			limits,
		}
	}

	/// Current registry version.
	fn registry(&self) -> Arc<CorpusRegistry> {
		self.registry.read().clone()
	}

	/// Applies a mutation under the write lock.
	fn update<T>(&self, f: impl FnOnce(&mut CorpusRegistry) -> T) -> T {
		let mut registry = self.registry.write();
		f(Arc::make_mut(&mut *registry))
	}

	/// Loads `<data_dir>/<name>.txt` (or its cached snapshot) into the registry.
	fn load_source(&self, name: &str) -> Result<usize, String> {
		let config = self.registry().config().clone();
		let path = self.data_dir.join(format!("{name}.txt"));

		// Training runs without holding the lock
		let model = CorpusModel::from_text_file(&path, &config).map_err(|e| format!("Failed to load model '{name}': {e}"))?;
		let sentences = model.sentence_count();
		self.update(|registry| registry.insert(name, model));

		log::info!("Source '{}' loaded ({} sentences)", name, sentences);
		Ok(sentences)
	}
}

impl GenerateParams {
	/// Determines the starting state strategy.
	fn start_state(&self) -> Result<StartState, String> {
		match &self.seed {
			None => Ok(StartState::Sentinel),
			Some(s) if s.eq_ignore_ascii_case("none") => Ok(StartState::Sentinel),
			Some(s) if s.eq_ignore_ascii_case("random") => Ok(StartState::Random),
			Some(s) if s.to_lowercase().starts_with("custom:") => {
				let value = s["custom:".len()..].trim();
				if value.is_empty() {
					Err("Custom seed cannot be empty".into())
				} else {
					Ok(StartState::Words(value.to_owned()))
				}
			}
			Some(_) => Err("Seed must be 'none', 'random' or start with 'custom:'".into()),
		}
	}

	/// Builds the generation constraints, defaults filling the gaps.
	///
	/// Requests above `limits` are refused rather than clamped.
	fn constraints(&self, limits: &Limits) -> Result<Constraints, String> {
		if let Some(max_attempts) = self.max_attempts.filter(|&n| n > limits.max_attempts) {
			return Err(format!(
				"max_attempts {max_attempts} exceeds the limit of {}",
				limits.max_attempts
			));
		}
		if let Some(max_tokens) = self.max_tokens.filter(|&n| n > limits.max_tokens) {
			return Err(format!(
				"max_tokens {max_tokens} exceeds the limit of {}",
				limits.max_tokens
			));
		}

		let defaults = Constraints::default();
		let constraints = Constraints {
			max_attempts: self
				.max_attempts
				.unwrap_or(defaults.max_attempts.min(limits.max_attempts)),
			max_tokens: self
				.max_tokens
				.unwrap_or(defaults.max_tokens.min(limits.max_tokens)),
			min_tokens: self.min_tokens.unwrap_or(defaults.min_tokens),
			start: self.start_state()?,
			must_contain: self
				.contains
				.as_deref()
				.map(str::trim)
				.filter(|word| !word.is_empty())
				.map(str::to_owned),
			..defaults
		};
		constraints.validate().map_err(|e| e.to_string())?;
		Ok(constraints)
	}
}

/// Source labels double as file names.
fn is_valid_label(label: &str) -> bool {
	!label.is_empty()
		&& label
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn truncate_chars(text: String, max_chars: usize) -> String {
	match text.char_indices().nth(max_chars) {
		Some((index, _)) => text[..index].to_owned(),
		None => text,
	}
}

/// HTTP POST endpoint `/v1/ingest`
///
/// Learns the request body, one message per line, into `source`.
/// Returns the number of sentences learned.
#[post("/v1/ingest")]
async fn post_ingest(data: web::Data<SharedData>, query: web::Query<SourceQuery>, body: String) -> impl Responder {
	let label = match query.source.as_deref().map(str::trim) {
		Some(label) if is_valid_label(label) => label,
		_ => return HttpResponse::BadRequest().body("Missing or invalid source"),
	};

	let learned: usize = data.update(|registry| body.lines().map(|line| registry.ingest(label, line)).sum());

	log::debug!("Source '{}' learned {} sentences", label, learned);
	HttpResponse::Ok().body(learned.to_string())
}

/// HTTP GET endpoint `/v1/generate`
///
/// Generates a sentence from `source`, or from any loaded source when absent.
/// Generation failures are logged and answered with a fixed message.
///
/// The walk runs on the blocking pool against the registry version current
/// at request time; no lock is held meanwhile.
#[get("/v1/generate")]
async fn get_generated(data: web::Data<SharedData>, query: web::Query<GenerateParams>) -> impl Responder {
	let constraints = match query.constraints(&data.limits) {
		Ok(c) => c,
		Err(e) => return HttpResponse::BadRequest().body(e),
	};

	let registry = data.registry();
	let source = query.source.clone();
	let result = web::block(move || -> Result<String, String> {
		let mut rng = rand::rng();
		let generation = match source.as_deref() {
			Some(label) => registry
				.get(label)
				.ok_or_else(|| format!("unknown source '{label}'"))?
				.generate(&constraints, &mut rng),
			None => registry
				.generate(&registry.make_weights(), &constraints, &mut rng)
				.map(|(_, generation)| generation),
		};
		generation.map(|g| g.into_text()).map_err(|e| e.to_string())
	})
	.await;

	match result {
		Ok(Ok(text)) => HttpResponse::Ok().body(truncate_chars(text, data.limits.max_chars)),
		Ok(Err(e)) => {
			log::warn!("Generation failed: {}", e);
			HttpResponse::Ok().body(FALLBACK_MESSAGE)
		}
		Err(e) => {
			log::error!("Generation task failed: {}", e);
			HttpResponse::Ok().body(FALLBACK_MESSAGE)
		}
	}
}

/// HTTP GET endpoint `/v1/sources`
///
/// One `<label> <sentence count>` line per loaded source.
#[get("/v1/sources")]
async fn get_sources(data: web::Data<SharedData>) -> impl Responder {
	let registry = data.registry();
	let lines: Vec<String> = registry
		.labels()
		.into_iter()
		.map(|label| {
			let count = registry.get(&label).map_or(0, CorpusModel::sentence_count);
			format!("{label} {count}")
		})
		.collect();
	HttpResponse::Ok().body(lines.join("\n"))
}

/// HTTP GET endpoint `/v1/models`
///
/// Names of the `<name>.txt` corpora available in the data directory.
#[get("/v1/models")]
async fn get_models(data: web::Data<SharedData>) -> impl Responder {
	let files = match list_files(&data.data_dir, "txt") {
		Ok(files) => files,
		Err(e) => {
			log::error!("Failed to list {}: {}", data.data_dir.display(), e);
			return HttpResponse::InternalServerError().body("Failed to list models");
		}
	};
	let names: Vec<String> = files
		.iter()
		.filter_map(|file| get_filename(file).ok())
		.filter(|name| is_valid_label(name))
		.collect();
	HttpResponse::Ok().body(names.join("\n"))
}

#[put("/v1/load_models")]
async fn put_models(data: web::Data<SharedData>, query: web::Query<ModelQuery>) -> impl Responder {
	let query_names = match &query.names {
		Some(s) if !s.trim().is_empty() => s.trim(),
		_ => return HttpResponse::BadRequest().body("Missing or empty model name"),
	};

	let model_names: Vec<&str> = query_names
		.split(',')
		.map(|s| s.trim())
		.filter(|s| !s.is_empty())
		.collect();

	if let Some(name) = model_names.iter().find(|name| !is_valid_label(name)) {
		return HttpResponse::BadRequest().body(format!("Invalid model name '{name}'"));
	}

	for name in model_names {
		if let Err(e) = data.load_source(name) {
			log::error!("{}", e);
			return HttpResponse::InternalServerError().body(e);
		}
	}

	HttpResponse::Ok().body("Models loaded successfully")
}

/// HTTP PUT endpoint `/v1/save`
///
/// Writes `<data_dir>/<label>.bin` for every source.
#[put("/v1/save")]
async fn put_save(data: web::Data<SharedData>) -> impl Responder {
	let registry = data.registry();
	for (label, model) in registry.iter() {
		let path = match build_output_path(data.data_dir.join(label), "bin") {
			Ok(path) => path,
			Err(e) => return HttpResponse::InternalServerError().body(format!("Invalid path for '{label}': {e}")),
		};
		if let Err(e) = model.save(&path) {
			log::error!("Failed to save '{}': {}", label, e);
			return HttpResponse::InternalServerError().body(format!("Failed to save '{label}'"));
		}
	}
	HttpResponse::Ok().body(format!("{} sources saved", registry.len()))
}

#[post("/v1/reset")]
async fn post_reset(data: web::Data<SharedData>, query: web::Query<SourceQuery>) -> impl Responder {
	let Some(label) = query.source.as_deref() else {
		return HttpResponse::BadRequest().body("Missing source");
	};
	match data.update(|registry| registry.reset(label)) {
		Ok(()) => {
			log::info!("Source '{}' reset", label);
			HttpResponse::Ok().body("Source reset")
		}
		Err(e) => HttpResponse::NotFound().body(e.to_string()),
	}
}

fn configure(cfg: &mut web::ServiceConfig) {
	cfg.service(post_ingest)
		.service(get_generated)
		.service(get_sources)
		.service(get_models)
		.service(put_models)
		.service(put_save)
		.service(post_reset);
}

/// Main entry point for the server.
///
/// Builds an empty registry, loads the startup sources, and serves the
/// `/v1` endpoints.
///
/// # Notes
/// - Every option can be given through its `MARKOV_*` environment variable.
/// - Log verbosity follows `RUST_LOG` (default `info`).
#[actix_web::main]
async fn main() -> std::io::Result<()> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
	let args = Args::parse();

	let config = CorpusConfig::new(args.order).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
	let limits = Limits {
		max_attempts: args.max_attempts,
		max_tokens: args.max_tokens,
		max_chars: args.max_chars,
	};
	let shared_data = SharedData::new(config, normalize_folder(&args.data_dir), limits);

	for name in args.sources.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
		if let Err(e) = shared_data.load_source(name) {
			log::error!("{}", e);
		}
	}

	let shared_data = web::Data::new(shared_data);
	let permissive_cors = args.permissive_cors;

	log::info!("Listening on {}:{}", args.bind, args.port);
	HttpServer::new(move || {
		let cors = if permissive_cors {
			Cors::permissive()
		} else {
			Cors::default()
		};
		App::new()
			.wrap(cors)
			.app_data(shared_data.clone())
			.configure(configure)
	})
	.bind((args.bind.as_str(), args.port))?
	.run()
	.await
}

#[cfg(test)]
mod tests {
	use super::*;
	use actix_web::body::to_bytes;
	use actix_web::http::StatusCode;
	use actix_web::test;
	use rs_markov_core::LearningFilter;

	fn shared(data_dir: PathBuf) -> web::Data<SharedData> {
		let config = CorpusConfig::new(1)
			.unwrap()
			.with_filter(LearningFilter::permissive());
		let limits = Limits {
			max_attempts: 100,
			max_tokens: 256,
			max_chars: 1024,
		};
		web::Data::new(SharedData::new(config, data_dir, limits))
	}

	macro_rules! app {
		($data:expr) => {
			test::init_service(App::new().app_data($data.clone()).configure(configure)).await
		};
	}

	async fn body_of(resp: actix_web::dev::ServiceResponse) -> String {
		let bytes = to_bytes(resp.into_body()).await.unwrap();
		String::from_utf8(bytes.to_vec()).unwrap()
	}

	#[actix_web::test]
	async fn test_ingest_then_generate() {
		let data = shared(PathBuf::from("."));
		let app = app!(data);

		let req = test::TestRequest::post()
			.uri("/v1/ingest?source=general")
			.set_payload("I like cats. I like dogs.\nDogs like bones.")
			.to_request();
		let resp = test::call_service(&app, req).await;
		assert_eq!(resp.status(), StatusCode::OK);
		assert_eq!(body_of(resp).await, "3");

		let req = test::TestRequest::get()
			.uri("/v1/generate?source=general&max_attempts=50&contains=like")
			.to_request();
		let text = body_of(test::call_service(&app, req).await).await;
		assert!(text.to_lowercase().contains("like"), "{text}");

		let req = test::TestRequest::get().uri("/v1/sources").to_request();
		assert_eq!(body_of(test::call_service(&app, req).await).await, "general 3");
	}

	#[actix_web::test]
	async fn test_generation_failures_use_fallback() {
		let data = shared(PathBuf::from("."));
		let app = app!(data);

		for uri in ["/v1/generate", "/v1/generate?source=missing"] {
			let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
			assert_eq!(resp.status(), StatusCode::OK);
			assert_eq!(body_of(resp).await, FALLBACK_MESSAGE);
		}

		// A single sentence can only be replayed
		data.update(|registry| registry.ingest("general", "only one sentence."));
		let req = test::TestRequest::get().uri("/v1/generate?source=general").to_request();
		assert_eq!(body_of(test::call_service(&app, req).await).await, FALLBACK_MESSAGE);
	}

	#[actix_web::test]
	async fn test_generation_budget_is_capped() {
		let data = shared(PathBuf::from("."));
		data.update(|registry| registry.ingest("general", "only one sentence."));
		let app = app!(data);

		for uri in [
			"/v1/generate?source=general&max_attempts=3000000",
			"/v1/generate?source=general&max_attempts=101",
			"/v1/generate?source=general&max_tokens=100000",
			"/v1/generate?max_attempts=18446744073709551615",
		] {
			let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
			assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
		}

		// At the cap the request is served, here with the fallback answer
		let req = test::TestRequest::get()
			.uri("/v1/generate?source=general&max_attempts=100&max_tokens=256")
			.to_request();
		let resp = test::call_service(&app, req).await;
		assert_eq!(resp.status(), StatusCode::OK);
		assert_eq!(body_of(resp).await, FALLBACK_MESSAGE);

		// Ingestion is not blocked by earlier generations
		let req = test::TestRequest::post()
			.uri("/v1/ingest?source=general")
			.set_payload("another sentence here.")
			.to_request();
		assert_eq!(body_of(test::call_service(&app, req).await).await, "1");
	}

	#[actix_web::test]
	async fn test_bad_requests() {
		let data = shared(PathBuf::from("."));
		let app = app!(data);

		for (method, uri) in [
			(test::TestRequest::get(), "/v1/generate?seed=sometimes"),
			(test::TestRequest::get(), "/v1/generate?seed=custom:"),
			(test::TestRequest::get(), "/v1/generate?min_tokens=10&max_tokens=2"),
			(test::TestRequest::get(), "/v1/generate?max_attempts=0"),
			(test::TestRequest::post(), "/v1/ingest"),
			(test::TestRequest::post(), "/v1/ingest?source=../etc"),
			(test::TestRequest::put(), "/v1/load_models"),
			(test::TestRequest::put(), "/v1/load_models?names=a,../b"),
		] {
			let resp = test::call_service(&app, method.uri(uri).to_request()).await;
			assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
		}

		let req = test::TestRequest::post().uri("/v1/reset?source=missing").to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
	}

	#[actix_web::test]
	async fn test_load_save_and_reset() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("cats.txt"), "I like cats.\nCats like naps.\n").unwrap();
		std::fs::write(dir.path().join("bad name.txt"), "skipped.\n").unwrap();
		std::fs::write(dir.path().join("notes.bin"), "not a corpus").unwrap();
		let data = shared(dir.path().to_path_buf());
		let app = app!(data);

		let req = test::TestRequest::get().uri("/v1/models").to_request();
		assert_eq!(body_of(test::call_service(&app, req).await).await, "cats");

		let req = test::TestRequest::put().uri("/v1/load_models?names=cats").to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
		assert!(dir.path().join("cats.bin").exists());
		assert_eq!(data.registry().get("cats").unwrap().sentence_count(), 2);

		let req = test::TestRequest::put().uri("/v1/load_models?names=nothing").to_request();
		assert_eq!(
			test::call_service(&app, req).await.status(),
			StatusCode::INTERNAL_SERVER_ERROR
		);

		let req = test::TestRequest::post()
			.uri("/v1/ingest?source=fresh")
			.set_payload("brand new words.")
			.to_request();
		test::call_service(&app, req).await;
		let req = test::TestRequest::put().uri("/v1/save").to_request();
		assert_eq!(body_of(test::call_service(&app, req).await).await, "2 sources saved");
		assert!(dir.path().join("fresh.bin").exists());

		let req = test::TestRequest::post().uri("/v1/reset?source=cats").to_request();
		assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
		assert!(data.registry().get("cats").unwrap().is_empty());
	}

	#[actix_web::test]
	async fn test_truncate_chars() {
		assert_eq!(truncate_chars("héllo".to_owned(), 2), "hé");
		assert_eq!(truncate_chars("short".to_owned(), 1024), "short");
		assert!(is_valid_label("general_2"));
		assert!(!is_valid_label("a/b"));
		assert!(!is_valid_label(""));
	}
}
