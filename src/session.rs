// Interactive command language for driving the dashboard from a terminal

use crate::controller::{ControlEvent, PageSink, ReloadController, ReloadState};
use crate::ir::LayoutMode;
use crate::source::AggregateSource;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0, space1},
    combinator::{all_consuming, map, opt, rest, value, verify},
    multi::many0,
    sequence::{delimited, preceded},
    IResult,
};
use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Load(String),
    /// `None` clears the grouping
    Group(Option<String>),
    Show(ColumnFilter),
    Layout(LayoutMode),
    Status,
    Ack,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnFilter {
    All,
    Only(Vec<String>),
}

/// Whitespace-insensitive wrapper
fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn word(input: &str) -> IResult<&str, String> {
    map(
        take_while1(|c: char| !c.is_whitespace() && c != ','),
        str::to_string,
    )(input)
}

fn separator(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c == ' ' || c == '\t' || c == ',')(input)
}

fn parse_load(input: &str) -> IResult<&str, Command> {
    map(
        preceded(
            tag("load"),
            preceded(space1, verify(rest, |s: &str| !s.trim().is_empty())),
        ),
        |url: &str| Command::Load(url.trim().to_string()),
    )(input)
}

fn parse_group(input: &str) -> IResult<&str, Command> {
    map(preceded(tag("group"), opt(preceded(space1, word))), Command::Group)(input)
}

fn parse_show(input: &str) -> IResult<&str, Command> {
    preceded(
        tag("show"),
        alt((
            value(Command::Show(ColumnFilter::All), preceded(space1, char('*'))),
            map(many0(preceded(separator, word)), |cols| {
                Command::Show(ColumnFilter::Only(cols))
            }),
        )),
    )(input)
}

fn parse_layout(input: &str) -> IResult<&str, Command> {
    preceded(
        tag("layout"),
        preceded(
            space1,
            alt((
                value(Command::Layout(LayoutMode::Tabs), tag("tabs")),
                value(Command::Layout(LayoutMode::SideBySide), tag("side")),
            )),
        ),
    )(input)
}

pub fn parse_command(input: &str) -> IResult<&str, Command> {
    ws(alt((
        parse_load,
        parse_group,
        parse_show,
        parse_layout,
        value(Command::Status, tag("status")),
        value(Command::Ack, tag("ack")),
        value(Command::Help, tag("help")),
        value(Command::Quit, alt((tag("quit"), tag("exit")))),
    )))(input)
}

/// Parse one full input line.
pub fn parse_line(line: &str) -> Result<Command, String> {
    all_consuming(parse_command)(line)
        .map(|(_, command)| command)
        .map_err(|_| format!("unrecognised command: '{}' (try 'help')", line.trim()))
}

const HELP: &str = "\
commands:
  load <url>         register a dataset and show it
  group [column]     regroup by a column (no column clears the grouping)
  show * | show a b  choose which columns get charts
  layout tabs|side   switch page layout
  status             print the current dashboard state
  ack                dismiss the last error
  quit               leave";

/// Read commands from `input` until it ends or `quit` is given.
///
/// Failures are reported on `output` and the session carries on with the
/// last rendered dashboard.
pub fn run_session<S, K, R, W>(
    controller: &mut ReloadController<S, K>,
    input: R,
    mut output: W,
) -> io::Result<()>
where
    S: AggregateSource,
    K: PageSink,
    R: BufRead,
    W: Write,
{
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_line(&line) {
            Ok(command) => command,
            Err(message) => {
                writeln!(output, "error: {}", message)?;
                continue;
            }
        };

        let result = match command {
            Command::Quit => break,
            Command::Help => {
                writeln!(output, "{}", HELP)?;
                continue;
            }
            Command::Status => {
                write_status(controller, &mut output)?;
                continue;
            }
            Command::Ack => {
                controller.acknowledge_error();
                continue;
            }
            Command::Load(url) => controller.dispatch(ControlEvent::SubmitUrl(url)),
            Command::Group(column) => {
                controller.dispatch(ControlEvent::SelectGrouping(column))
            }
            Command::Show(ColumnFilter::All) => {
                let all = controller.selection().universe().to_vec();
                controller.dispatch(ControlEvent::SelectColumns(all))
            }
            Command::Show(ColumnFilter::Only(columns)) => {
                controller.dispatch(ControlEvent::SelectColumns(columns))
            }
            Command::Layout(layout) => controller.dispatch(ControlEvent::SetLayout(layout)),
        };

        match result {
            Ok(()) => write_status(controller, &mut output)?,
            Err(e) => writeln!(output, "error: {}", e)?,
        }
    }
    Ok(())
}

fn write_status<S, K, W>(controller: &ReloadController<S, K>, output: &mut W) -> io::Result<()>
where
    S: AggregateSource,
    K: PageSink,
    W: Write,
{
    let Some(page) = controller.page() else {
        return writeln!(output, "state: {:?}, nothing rendered", controller.state());
    };

    let groups: Vec<&str> = page.nav.iter().map(|n| n.label.as_str()).collect();
    writeln!(
        output,
        "state: {:?}; groups: {}; charts: {}; grouping: {}",
        controller.state(),
        groups.join(", "),
        page.charts().count(),
        controller.selection().active_grouping().unwrap_or("-"),
    )?;
    if controller.state() == ReloadState::Error {
        if let Some(error) = controller.last_error() {
            writeln!(output, "last error: {}", error)?;
        }
    }
    Ok(())
}
