use std::collections::VecDeque;
use std::error::Error;
use std::fs;

use pbinspect::{decode_batch, AddDefaultValue, DecodeOptions, SchemaRepository};
use tracing_subscriber::EnvFilter;

struct Args {
    /// Files containing captured messages.
    inputs: Vec<String>,

    /// Serialized `FileDescriptorSet` to load the schema from.
    schema: Option<String>,

    /// Fully qualified name of the message type.
    message: Option<String>,

    /// JSON file with decoding options.
    config: Option<String>,

    /// Input files contain hex text rather than binary data.
    hex: bool,

    /// Options set on the command line. These override the config file and
    /// environment.
    json: bool,
    all_types: bool,
    try_string: bool,
    bytes_as_string: bool,
    local_time: bool,
    defaults: Option<AddDefaultValue>,
    max_depth: Option<u32>,

    /// Enable verbose logging.
    verbose: bool,
}

fn parse_args() -> Result<Args, lexopt::Error> {
    use lexopt::prelude::*;

    let mut values = VecDeque::new();
    let mut schema = None;
    let mut message = None;
    let mut config = None;
    let mut hex = false;
    let mut json = false;
    let mut all_types = false;
    let mut try_string = false;
    let mut bytes_as_string = false;
    let mut local_time = false;
    let mut defaults = None;
    let mut max_depth = None;
    let mut verbose = false;

    let mut parser = lexopt::Parser::from_env();
    while let Some(arg) = parser.next()? {
        match arg {
            Value(val) => values.push_back(val.string()?),
            Short('s') | Long("schema") => schema = Some(parser.value()?.string()?),
            Short('m') | Long("message") => message = Some(parser.value()?.string()?),
            Short('c') | Long("config") => config = Some(parser.value()?.string()?),
            Long("hex") => hex = true,
            Short('j') | Long("json") => json = true,
            Short('a') | Long("all-types") => all_types = true,
            Long("try-string") => try_string = true,
            Long("bytes-as-string") => bytes_as_string = true,
            Long("local-time") => local_time = true,
            Long("defaults") => defaults = Some(parser.value()?.parse()?),
            Long("max-depth") => max_depth = Some(parser.value()?.parse()?),
            Short('v') | Long("verbose") => verbose = true,
            Short('h') | Long("help") => {
                println!(
                    "Decode captured Protocol Buffers messages.

Usage: {bin_name} [OPTIONS] <file>...

Options:

  -s, --schema <file>    Load message types from a FileDescriptorSet
                         (created with `protoc --descriptor_set_out`)
  -m, --message <type>   Fully qualified name of the message type
  -c, --config <file>    Load decoding options from a JSON file

  --hex                  Input files contain hex text instead of binary data
  -j, --json             Print the JSON mapping of each message
  -a, --all-types        Show all possible types of fields without a schema
  --try-string           Try to decode length-delimited fields as strings
  --bytes-as-string      Display bytes fields as strings
  --defaults <policy>    Add values for missing fields. One of \"none\",
                         \"declared_only\", \"declared_plus_enum_bool\", \"all\"
  --local-time           Display timestamps in the local time zone
  --max-depth <n>        Maximum nesting depth of embedded messages (at
                         most {max_depth})

  -v, --verbose          Enable verbose logging
  -h, --help             Print help

Options are also read from PBINSPECT_* environment variables. Command line
flags take precedence over the environment, which takes precedence over
the config file.
",
                    bin_name = parser.bin_name().unwrap_or("pbinspect"),
                    max_depth = pbinspect::MAX_RECURSION_DEPTH,
                );
                std::process::exit(0);
            }
            _ => return Err(arg.unexpected()),
        }
    }

    if values.is_empty() {
        return Err("missing `<file>` arg".into());
    }

    Ok(Args {
        inputs: values.into(),
        schema,
        message,
        config,
        hex,
        json,
        all_types,
        try_string,
        bytes_as_string,
        local_time,
        defaults,
        max_depth,
        verbose,
    })
}

/// Resolve decoding options from, in increasing order of precedence, the
/// defaults, the config file, the environment and the command line.
fn decode_options(args: &Args) -> Result<DecodeOptions, Box<dyn Error>> {
    let mut opts = match &args.config {
        Some(path) => DecodeOptions::from_json_file(path)?,
        None => DecodeOptions::default(),
    }
    .with_env_overrides();

    opts.display_json_mapping |= args.json;
    opts.show_all_possible_field_types |= args.all_types;
    opts.try_dissect_as_string |= args.try_string;
    opts.dissect_bytes_as_string |= args.bytes_as_string;
    if args.local_time {
        opts.use_utc_for_timestamps = false;
    }
    if let Some(policy) = args.defaults {
        opts.add_default_value = policy;
    }
    if let Some(depth) = args.max_depth {
        opts.max_recursion_depth = depth;
    }

    Ok(opts)
}

/// Parse hex text into bytes. Whitespace between digits is ignored.
fn parse_hex(text: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    hex::decode(digits).map_err(|err| format!("invalid hex input: {}", err))
}

fn read_input(path: &str, hex: bool) -> Result<Vec<u8>, Box<dyn Error>> {
    if hex {
        let text = fs::read_to_string(path)?;
        Ok(parse_hex(&text)?)
    } else {
        Ok(fs::read(path)?)
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Tool for decoding captured Protocol Buffers messages.
///
/// ```
/// protoc --descriptor_set_out=schema.pb --include_imports service.proto
/// cargo run -p pbinspect-cli -- -s schema.pb -m pkg.Request request.bin
/// ```
///
/// Set `RUST_LOG=trace` to log each wire record as it is read.
fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args()?;
    init_logging(args.verbose);

    let opts = decode_options(&args)?;
    let schema = match &args.schema {
        Some(path) => Some(SchemaRepository::from_descriptor_set(&fs::read(path)?)?),
        None => None,
    };
    if let Some(schema) = &schema {
        tracing::debug!(message_types = schema.message_count(), "loaded schema");
    }

    let buffers = args
        .inputs
        .iter()
        .map(|path| read_input(path, args.hex))
        .collect::<Result<Vec<_>, _>>()?;

    let results = decode_batch(&buffers, schema.as_ref(), args.message.as_deref(), &opts);

    let mut failures = 0;
    for (path, decoded) in args.inputs.iter().zip(results) {
        if args.inputs.len() > 1 {
            println!("{}:", path);
        }
        print!("{}", decoded.tree.render());
        if let Some(json) = &decoded.json {
            println!("{}", serde_json::to_string_pretty(json)?);
        }
        if let Err(err) = &decoded.result {
            eprintln!("Failed to decode {}: {}", path, err);
            failures += 1;
        }
    }

    if failures > 0 {
        return Err(format!("{} of {} messages failed to decode", failures, buffers.len()).into());
    }

    Ok(())
}
