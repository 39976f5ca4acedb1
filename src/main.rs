//! Purpose: `talabarteria` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit JSON on stdout (pretty on a terminal).
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: All product reads and writes go through `api::ProductView`.
#![allow(clippy::result_large_err)]
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{
    Args, CommandFactory, Parser, Subcommand, ValueEnum, ValueHint,
    error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod serve;

use talabarteria::api::{
    Category, CategoryTotal, Error, ErrorKind, LocalClient, Product, ProductDraft, ProductStore,
    ProductView, RemoteClient, to_exit_code,
};
use talabarteria::data_paths::default_data_dir;
use talabarteria::notice::{Notice, notice_json};

type DynStore = Box<dyn ProductStore + Send + Sync>;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Internal)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                let message = clap_error_summary(&err);
                let hint = clap_error_hint(&err);
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(message)
                        .with_hint(hint),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    init_tracing(default_log_level(&cli.command));

    let target = StoreTarget {
        data_dir: cli.dir.unwrap_or_else(default_data_dir),
        remote: cli.remote,
        token: cli.token,
    };

    let result = command_dispatch::dispatch_command(cli.command, target, color_mode);

    result
        .map_err(add_store_unavailable_hint)
        .map_err(add_corrupt_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let replacement = arg.to_str().and_then(|value| match value {
                "---help" => Some("--help"),
                "---version" => Some("--version"),
                _ => None,
            });
            replacement.map(OsString::from).unwrap_or_else(|| arg)
        })
        .collect()
}

fn default_log_level(command: &Command) -> &'static str {
    match command {
        Command::Serve(_) => "info",
        _ => "warn",
    }
}

fn init_tracing(default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "talabarteria",
    version,
    about = "Product inventory for the leather workshop",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Products live in the `productos` collection, either in a local data
directory or behind a `talabarteria serve` instance (--remote).

Mental model:
  - `list` shows products, optionally filtered by name or price
  - `add` / `edit` / `delete` change the catalog
  - `stats` totals stock per category
"#,
    after_help = r#"EXAMPLES
  $ talabarteria add --nombre "Cinto trenzado" --descripcion "Cuero vacuno" \
      --precio 45.90 --cantidad 7 --categoria vestimenta --image file:///fotos/cinto.jpg
  $ talabarteria list --query cinto
  $ talabarteria stats --export ./categorias.txt
  $ talabarteria serve --bind 127.0.0.1:9800
  $ talabarteria --remote http://127.0.0.1:9800 list

LEARN MORE
  $ talabarteria <command> --help"#,
    arg_required_else_help = true,
    disable_help_subcommand = false
)]
struct Cli {
    #[arg(
        long,
        env = "TALABARTERIA_DIR",
        help = "Data directory for local collections (default: ~/.talabarteria/data)",
        value_hint = ValueHint::DirPath
    )]
    dir: Option<PathBuf>,
    #[arg(
        long,
        env = "TALABARTERIA_REMOTE",
        help = "Base URL of a talabarteria server (e.g. http://127.0.0.1:9800)",
        value_hint = ValueHint::Url
    )]
    remote: Option<String>,
    #[arg(
        long,
        env = "TALABARTERIA_TOKEN",
        hide_env_values = true,
        help = "Bearer token sent to --remote"
    )]
    token: Option<String>,
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "List products",
        long_about = r#"List every product in the collection.

With --query, only products whose name or price contains the text
(case-insensitive) are shown."#,
        after_help = r#"EXAMPLES
  $ talabarteria list
  $ talabarteria list --query bolso
  $ talabarteria list --query 45.9"#
    )]
    List {
        #[arg(long, short = 'q', help = "Case-insensitive match on name or price text")]
        query: Option<String>,
    },
    #[command(
        about = "Add a product",
        after_help = r#"EXAMPLES
  $ talabarteria add --nombre Bolso --descripcion "Cuero curtido" \
      --precio 120 --cantidad 3 --categoria bolsos --image file:///fotos/bolso.jpg

NOTES
  - Categories: vestimenta, bolsos, montura, caballos, herramientas, hogar, calzado, personales
  - --require-image rejects the product when no --image is given"#
    )]
    Add(AddArgs),
    #[command(
        about = "Edit a product",
        long_about = r#"Edit a stored product.

Fields not given keep their stored value. The whole product is validated
again before it is written."#,
        after_help = r#"EXAMPLES
  $ talabarteria edit Xb3kPq9... --precio 50 --cantidad 4"#
    )]
    Edit(EditArgs),
    #[command(
        about = "Delete a product",
        after_help = r#"NOTES
  - Deleting an id that no longer exists succeeds"#
    )]
    Delete {
        #[arg(help = "Product id")]
        id: String,
    },
    #[command(
        about = "Total stock per category",
        after_help = r#"EXAMPLES
  $ talabarteria stats
  $ talabarteria stats --export ./reportes/categorias.txt"#
    )]
    Stats {
        #[arg(
            long,
            help = "Also write a plain-text report to this path",
            value_hint = ValueHint::FilePath
        )]
        export: Option<PathBuf>,
    },
    #[command(
        about = "Serve local collections over HTTP",
        long_about = r#"Serve the local data directory over HTTP/JSON for `--remote` clients.

Binds loopback only unless --allow-non-loopback is given."#,
        after_help = r#"EXAMPLES
  $ talabarteria serve
  $ talabarteria serve --bind 127.0.0.1:9800 --token devtoken"#
    )]
    Serve(ServeArgs),
    #[command(about = "Print version info")]
    Version,
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

#[derive(Args)]
struct AddArgs {
    #[arg(long)]
    nombre: String,
    #[arg(long)]
    descripcion: String,
    #[arg(long, allow_hyphen_values = true)]
    precio: String,
    #[arg(long, allow_hyphen_values = true)]
    cantidad: String,
    #[arg(long, help = "Category key, e.g. bolsos")]
    categoria: String,
    #[arg(long, help = "Image URI from the picker, stored verbatim")]
    image: Option<String>,
    #[arg(long, help = "Reject the product when no image is given")]
    require_image: bool,
}

#[derive(Args)]
struct EditArgs {
    #[arg(help = "Product id")]
    id: String,
    #[arg(long)]
    nombre: Option<String>,
    #[arg(long)]
    descripcion: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    precio: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    cantidad: Option<String>,
    #[arg(long)]
    categoria: Option<String>,
    #[arg(long, help = "Replace the image URI")]
    image: Option<String>,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:9800", help = "Bind address")]
    bind: String,
    #[arg(long, help = "Require this bearer token on every request")]
    token: Option<String>,
    #[arg(long, help = "Allow binding a non-loopback address")]
    allow_non_loopback: bool,
    #[arg(long, default_value_t = 1024 * 1024, help = "Request body limit in bytes")]
    max_body_bytes: u64,
}

struct StoreTarget {
    data_dir: PathBuf,
    remote: Option<String>,
    token: Option<String>,
}

impl StoreTarget {
    fn open(&self) -> Result<DynStore, Error> {
        match &self.remote {
            Some(base_url) => {
                let mut client = RemoteClient::new(base_url.as_str())
                    .map_err(|err| err.with_hint("Use a base URL like http://127.0.0.1:9800."))?;
                if let Some(token) = &self.token {
                    client = client.with_token(token.as_str());
                }
                Ok(Box::new(client))
            }
            None => Ok(Box::new(LocalClient::new().with_data_dir(&self.data_dir))),
        }
    }

    fn label(&self) -> String {
        match &self.remote {
            Some(base_url) => base_url.clone(),
            None => self.data_dir.display().to_string(),
        }
    }
}

fn draft_from_add(args: AddArgs) -> (ProductDraft, bool) {
    let draft = ProductDraft {
        nombre: args.nombre,
        descripcion: args.descripcion,
        precio: args.precio,
        cantidad: args.cantidad,
        categoria: args.categoria,
        image: args.image,
    };
    (draft, args.require_image)
}

fn apply_edit(mut draft: ProductDraft, args: EditArgs) -> ProductDraft {
    if let Some(nombre) = args.nombre {
        draft.nombre = nombre;
    }
    if let Some(descripcion) = args.descripcion {
        draft.descripcion = descripcion;
    }
    if let Some(precio) = args.precio {
        draft.precio = precio;
    }
    if let Some(cantidad) = args.cantidad {
        draft.cantidad = cantidad;
    }
    if let Some(categoria) = args.categoria {
        draft.categoria = categoria;
    }
    if args.image.is_some() {
        draft.image = args.image;
    }
    draft
}

fn find_product(view: &ProductView<DynStore>, id: &str) -> Option<Product> {
    view.products().into_iter().find(|product| product.id == id)
}

fn product_json(product: &Product) -> Value {
    let mut value = product.to_json();
    if let Value::Object(map) = &mut value {
        map.insert(
            "image".to_string(),
            json!(product.image_url_or_default()),
        );
        if let Some(category) = product.category() {
            map.insert("categoryLabel".to_string(), json!(category.label()));
        }
    }
    value
}

fn category_json(total: &CategoryTotal) -> Value {
    let mut value = total.to_json();
    if let (Value::Object(map), Some(category)) = (&mut value, Category::parse(&total.category)) {
        map.insert("label".to_string(), json!(category.label()));
    }
    value
}

fn skipped_products_notice(skipped: usize, target: &StoreTarget) -> Option<Notice> {
    if skipped == 0 {
        return None;
    }
    let mut details = Map::new();
    details.insert("skipped_count".to_string(), json!(skipped));
    Some(Notice {
        kind: "skipped".to_string(),
        time: notice_time_now().unwrap_or_default(),
        cmd: "stats".to_string(),
        collection: target.label(),
        message: format!("{skipped} product(s) without a positive quantity or a category"),
        details,
    })
}

fn parse_bind(bind: &str) -> Result<SocketAddr, Error> {
    bind.parse().map_err(|_| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid bind address")
            .with_hint("Use a host:port value like 127.0.0.1:9800.")
    })
}

fn add_not_found_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::NotFound || err.hint().is_some() {
        return err;
    }
    err.with_hint("Run `talabarteria list` to see current product ids.")
}

fn add_validation_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Validation || err.hint().is_some() {
        return err;
    }
    err.with_hint("Fix the listed fields and retry; precio > 0, cantidad a positive whole number.")
}

fn add_store_unavailable_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::StoreUnavailable || err.hint().is_some() {
        return err;
    }
    err.with_hint("The store could not be reached; retrying is safe.")
}

fn add_corrupt_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Corrupt || err.hint().is_some() {
        return err;
    }
    err.with_hint("The collection file is not valid JSON; restore it from a backup.")
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint("Please report this issue with the command you ran.")
}

fn emit_version_output() {
    if io::stdout().is_terminal() {
        println!("talabarteria {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(json!({
            "name": "talabarteria",
            "version": env!("CARGO_PKG_VERSION"),
        }));
    }
}

fn emit_json(value: Value) {
    let pretty = io::stdout().is_terminal();
    let json = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn notice_time_now() -> Option<String> {
    use time::format_description::well_known::Rfc3339;
    let duration = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    let ts = time::OffsetDateTime::from_unix_timestamp_nanos(duration.as_nanos() as i128).ok()?;
    ts.format(&Rfc3339).ok()
}

fn emit_notice(notice: &Notice, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        let label = colorize_label("notice:", color_mode.use_color(is_tty), AnsiColor::Yellow);
        eprintln!("{label} {} ({})", notice.message, notice.collection);
        return;
    }

    let value = notice_json(notice);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Validation => "invalid product".to_string(),
        ErrorKind::ImageRequired => "an image is required".to_string(),
        ErrorKind::StoreUnavailable => "store unavailable".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(id) = err.id() {
        inner.insert("id".to_string(), json!(id));
    }
    if !err.fields().is_empty() {
        let fields = err.fields().iter().map(|field| field.to_json()).collect::<Vec<_>>();
        inner.insert("fields".to_string(), json!(fields));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    for field in err.fields() {
        lines.push(format!(
            "{} {field}",
            colorize_label("field:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(id) = err.id() {
        lines.push(format!(
            "{} {id}",
            colorize_label("id:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            display_path(path)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn display_path(path: &Path) -> String {
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        if let Ok(relative) = path.strip_prefix(&home) {
            return format!("~/{}", relative.display());
        }
    }
    path.display().to_string()
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);

    let Some(usage) = usage else {
        return "Try `talabarteria --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "talabarteria") else {
        return "Try `talabarteria --help`.".to_string();
    };

    let parts = tokens
        .iter()
        .skip(pos + 1)
        .take_while(|token| {
            !(token.starts_with('-') || token.starts_with('<') || token.starts_with('['))
        })
        .copied()
        .collect::<Vec<_>>();

    if parts.is_empty() {
        return "Try `talabarteria --help`.".to_string();
    }
    format!("Try `talabarteria {} --help`.", parts.join(" "))
}
