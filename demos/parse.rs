//! Parses a search query from the command line and prints the structured
//! result as JSON.
//!
//!     cargo run --example parse -- 'repo:linux file:\.c$ EXPORT_SYMBOL'
//!
//! Set `RUST_LOG=trace` to watch the scanner walk the query.

fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match codesearch_syntax::parse_query(&args.join(" ")) {
        Ok(query) => println!("{}", serde_json::to_string_pretty(&query).unwrap()),
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(1);
        }
    }
}
