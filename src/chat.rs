use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::assistant::Assistant;
use crate::error::Result;
use crate::query::{EntityType, RacfQuery};
use crate::systems::{self, SystemTable, INFO_KEYWORD};

const EXIT_KEYWORD: &str = "exit";

enum Flow {
    Continue,
    Exit,
}

/// Writes `prompt`, then reads one trimmed line. `None` at end of input.
fn ask<R: BufRead, W: Write>(input: &mut R, out: &mut W, prompt: &str) -> io::Result<Option<String>> {
    write!(out, "{}", prompt)?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn goodbye<W: Write>(out: &mut W) -> io::Result<Flow> {
    writeln!(out, "Thank you for using the chatbot. Goodbye!")?;
    Ok(Flow::Exit)
}

/// The interactive loop. Returns once the user types `exit` or input runs out.
pub async fn run<R: BufRead, W: Write>(
    assistant: &Assistant,
    systems_csv: &Path,
    input: &mut R,
    out: &mut W,
) -> io::Result<()> {
    loop {
        match interaction(assistant, systems_csv, input, out).await {
            Ok(Flow::Continue) => continue,
            Ok(Flow::Exit) => return Ok(()),
            Err(e) => {
                tracing::debug!(error = ?e, "interaction aborted");
                writeln!(out, "An error occurred: {}", e)?;
            }
        }
    }
}

async fn interaction<R: BufRead, W: Write>(
    assistant: &Assistant,
    systems_csv: &Path,
    input: &mut R,
    out: &mut W,
) -> Result<Flow> {
    writeln!(out, "\nWelcome to the z/OS User and Group Information Chatbot")?;
    let Some(answer) = ask(
        input,
        out,
        "Do you want information about a 'user' or a 'group'? (Type 'exit' to terminate): ",
    )?
    else {
        return Ok(goodbye(out)?);
    };
    let answer = answer.to_lowercase();
    if answer == EXIT_KEYWORD {
        return Ok(goodbye(out)?);
    }
    let Ok(entity_type) = answer.parse::<EntityType>() else {
        writeln!(out, "Invalid input. Please select 'user' or 'group'.")?;
        return Ok(Flow::Continue);
    };

    let Some(environment) = ask(
        input,
        out,
        "Please provide the environment (e.g., server XYZ) or type 'info' to get all information: ",
    )?
    else {
        return Ok(goodbye(out)?);
    };

    let table = SystemTable::load(systems_csv)?;

    if environment.eq_ignore_ascii_case(INFO_KEYWORD) {
        for row in table.rows() {
            writeln!(out, "{}", systems::describe(row))?;
        }
        return Ok(Flow::Continue);
    }

    let matches = table.matches(&environment);
    if environment.is_empty() || matches.is_empty() {
        writeln!(out, "The environment {} is not in the system list.", environment)?;
        return Ok(Flow::Continue);
    }

    let mut host = None;
    for row in matches {
        let prompt = format!("Do you mean '{}'? (yes/no): ", row.system);
        let Some(confirmation) = ask(input, out, &prompt)? else {
            return Ok(goodbye(out)?);
        };
        if confirmation.eq_ignore_ascii_case("yes") {
            tracing::debug!(system = %row.system, host = %row.host, "system confirmed");
            host = Some(row.host.clone());
            break;
        }
    }
    let Some(host) = host else {
        writeln!(out, "No host was found for the provided environment.")?;
        return Ok(Flow::Continue);
    };

    let prompt = format!("Please provide the {} name: ", entity_type);
    let Some(entity_name) = ask(input, out, &prompt)? else {
        return Ok(goodbye(out)?);
    };
    if entity_name.is_empty() {
        writeln!(out, "Invalid input. The {} name cannot be empty.", entity_type)?;
        return Ok(Flow::Continue);
    }

    writeln!(out, "Querying the information, this may take a few moments...")?;
    let query = RacfQuery {
        host,
        entity_type,
        entity_name,
    };
    assistant.answer(&query, out).await?;
    Ok(Flow::Continue)
}
