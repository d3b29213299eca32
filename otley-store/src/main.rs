use std::env;
use std::fmt;
use std::fs::metadata;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use futures::StreamExt;
use otley::btree::expected_data_page_capacity;
use otley::btree::expected_index_page_capacity;
use otley::btree::Direction;
use otley::btree::Otley;
use otley::btree::Property;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde::{Deserialize, Serialize};
use strum::EnumString;

const NAME_LENGTH: usize = 11;

/// The example record this store indexes, keyed by id.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
struct Record {
    id: i32,
    age: i32,
    name: [u8; NAME_LENGTH],
}

impl Record {
    fn new(id: i32, age: i32, name: &str) -> Self {
        let mut buf = [0u8; NAME_LENGTH];
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_LENGTH - 1);
        buf[..len].copy_from_slice(&bytes[..len]);
        Self { id, age, name: buf }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self
            .name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(NAME_LENGTH);
        let name = String::from_utf8_lossy(&self.name[..end]);
        write!(f, "({}, {}, {})", self.id, self.age, name)
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Index directory (created on first use)
    store: String,

    /// Allow repeated ids (only honored when the index is first created)
    #[arg(short, long, default_value_t = false)]
    duplicates: bool,

    #[command(subcommand)]
    parameter: Option<Parameter>,
}

#[derive(Debug, EnumString, Subcommand)]
#[strum(ascii_case_insensitive)]
enum Parameter {
    /// Records with lower <= id
    Above { lower: i32 },
    /// Records with id <= upper
    Below { upper: i32 },
    /// Records with lower <= id <= upper
    Between { lower: i32, upper: i32 },
    /// Does the store contain this id
    Contains { id: i32 },
    /// Display record count
    Count,
    /// Interactive Help
    Help,
    /// Insert a record
    Insert { id: i32, age: i32, name: String },
    /// List indexed ids
    Keys {
        /// Direction (Descending or Ascending)
        direction: Option<Direction>,
    },
    /// List records
    Records {
        /// Direction (Descending or Ascending)
        direction: Option<Direction>,
    },
    /// Remove this id
    Remove { id: i32 },
    /// Find records with this id
    Search { id: i32 },
    /// Verify leaf chain ordering
    Verify,
}

fn get_history_file() -> Option<PathBuf> {
    dirs::preference_dir()
        .and_then(|mut base| {
            base.push("otley");
            // Note: Not create_dir_all(), because we don't want to create
            // preference dirs if they don't exist.
            if metadata(base.clone()).ok().is_none() {
                std::fs::create_dir(base.clone()).ok()?
            }
            Some(base)
        })
        .map(|mut base| {
            base.push("history.txt");
            base
        })
}

fn parse_number(word: &str) -> Result<i32, String> {
    word.parse().map_err(|_| format!("not a number: {word}"))
}

fn parse_direction(words: &[&str], usage: &str) -> Result<Option<Direction>, String> {
    match words.len() {
        1 => Ok(None),
        2 => Direction::from_str(words[1])
            .map(Some)
            .map_err(|_| usage.to_string()),
        _ => Err(usage.to_string()),
    }
}

/// Fill in an interactive command's arguments from the rest of the line.
fn parse_interactive(words: &[&str]) -> Result<Parameter, String> {
    let template = Parameter::from_str(words[0]).map_err(|e| format!("error: {e}"))?;
    let parameter = match template {
        Parameter::Above { .. } => {
            if words.len() != 2 {
                return Err("usage: above <lower>".to_string());
            }
            Parameter::Above {
                lower: parse_number(words[1])?,
            }
        }
        Parameter::Below { .. } => {
            if words.len() != 2 {
                return Err("usage: below <upper>".to_string());
            }
            Parameter::Below {
                upper: parse_number(words[1])?,
            }
        }
        Parameter::Between { .. } => {
            if words.len() != 3 {
                return Err("usage: between <lower> <upper>".to_string());
            }
            Parameter::Between {
                lower: parse_number(words[1])?,
                upper: parse_number(words[2])?,
            }
        }
        Parameter::Contains { .. } => {
            if words.len() != 2 {
                return Err("usage: contains <id>".to_string());
            }
            Parameter::Contains {
                id: parse_number(words[1])?,
            }
        }
        Parameter::Insert { .. } => {
            if words.len() != 4 {
                return Err("usage: insert <id> <age> <name>".to_string());
            }
            Parameter::Insert {
                id: parse_number(words[1])?,
                age: parse_number(words[2])?,
                name: words[3].to_string(),
            }
        }
        Parameter::Keys { .. } => Parameter::Keys {
            direction: parse_direction(words, "usage: keys [<direction>]")?,
        },
        Parameter::Records { .. } => Parameter::Records {
            direction: parse_direction(words, "usage: records [<direction>]")?,
        },
        Parameter::Remove { .. } => {
            if words.len() != 2 {
                return Err("usage: remove <id>".to_string());
            }
            Parameter::Remove {
                id: parse_number(words[1])?,
            }
        }
        Parameter::Search { .. } => {
            if words.len() != 2 {
                return Err("usage: search <id>".to_string());
            }
            Parameter::Search {
                id: parse_number(words[1])?,
            }
        }
        simple => simple,
    };
    Ok(parameter)
}

async fn interactive(btree: Otley<i32, Record>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    if let Some(file_location) = get_history_file() {
        if let Err(e) = rl.load_history(&file_location) {
            println!("error loading history: {e}");
        }
    }
    println!("terminate with ctrl-c or ctrl-d");
    loop {
        let readline = rl.readline("index: ");
        match readline {
            Ok(line) => {
                if line.is_empty() {
                    continue;
                }
                let words = line.split_whitespace().collect::<Vec<&str>>();
                match parse_interactive(&words) {
                    Ok(parameter) => {
                        process_parameter(&btree, &parameter).await;
                        rl.add_history_entry(line.as_str())?;
                    }
                    Err(message) => {
                        println!("{message}");
                        continue;
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("terminating...");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("terminating...");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
    if let Some(file_location) = get_history_file() {
        if let Err(e) = rl.save_history(&file_location) {
            println!("error saving history: {e}");
        }
    }
    Ok(())
}

fn print_records(records: &[Record]) {
    let mut sep = "";
    for record in records {
        print!("{sep}{record}");
        sep = ", ";
    }
    println!();
}

async fn process_parameter(btree: &Otley<i32, Record>, parameter: &Parameter) {
    match parameter {
        Parameter::Above { lower } => match btree.above(lower).await {
            Ok(records) => print_records(&records),
            Err(e) => println!("above failed: {e}"),
        },
        Parameter::Below { upper } => match btree.below(upper).await {
            Ok(records) => print_records(&records),
            Err(e) => println!("below failed: {e}"),
        },
        Parameter::Between { lower, upper } => match btree.between(lower, upper).await {
            Ok(records) => print_records(&records),
            Err(e) => println!("between failed: {e}"),
        },
        Parameter::Contains { id } => {
            if btree.contains(id).await {
                println!("true");
            } else {
                println!("false");
            }
        }
        Parameter::Count => match btree.count().await {
            Ok(count) => println!("count: {count}"),
            Err(e) => println!("count failed: {e}"),
        },
        Parameter::Help => {
            let help = Cli::command().render_help().to_string();

            let mut print_it = false;

            for line in help.lines() {
                if line.starts_with("Arguments:") {
                    print_it = false;
                }
                if print_it && !line.is_empty() {
                    println!("{}", line);
                }
                if line.starts_with("Commands:") {
                    print_it = true;
                }
            }
        }
        Parameter::Insert { id, age, name } => {
            match btree.insert(Record::new(*id, *age, name)).await {
                Ok(_) => println!("inserted: {id}"),
                Err(e) => println!("insert failed: {e}"),
            }
        }
        Parameter::Keys { direction } => {
            let direction = direction.unwrap_or(Direction::Ascending);
            let keys = btree.keys(direction).await.collect::<Vec<i32>>().await;
            let mut sep = "";
            for key in keys {
                print!("{sep}{key}");
                sep = ", ";
            }
            println!();
        }
        Parameter::Records { direction } => {
            let direction = direction.unwrap_or(Direction::Ascending);
            let records = btree.records(direction).await.collect::<Vec<Record>>().await;
            print_records(&records);
        }
        Parameter::Remove { id } => match btree.remove(id).await {
            Ok(_) => println!("removed: {id}"),
            Err(e) => println!("remove failed: {e}"),
        },
        Parameter::Search { id } => match btree.search(id).await {
            Ok(records) => print_records(&records),
            Err(e) => println!("search failed: {e}"),
        },
        Parameter::Verify => match btree.verify().await {
            Ok(_) => println!("Ok"),
            Err(e) => println!("Verification failed: {e}"),
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = match env::var("TMPDIR") {
        Ok(d) => d,
        Err(_e) => ".".to_string(),
    };

    let file_appender = tracing_appender::rolling::daily(log_dir, "otley.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt().with_writer(non_blocking).init();

    let property = Property::new(
        &cli.store,
        "metadata.json",
        "index.dat",
        expected_index_page_capacity::<i32>()?,
        expected_data_page_capacity::<Record>()?,
        !cli.duplicates,
    )?;
    let btree: Otley<i32, Record> = Otley::try_new(property, |r: &Record| r.id).await?;

    match cli.parameter {
        Some(parameter) => process_parameter(&btree, &parameter).await,
        None => interactive(btree).await?,
    }
    Ok(())
}
