use crate::error::{AppError, Result};
use crate::models::{EpisodeFilter, EpisodeOrder};

pub const USAGE: &str = "\
Usage: podtrack [--user <id>] <command>

Commands:
  add <feed-url>                 Subscribe to a podcast feed
  refresh <podcast-id>           Fetch new episodes for a subscribed podcast
  remove <podcast-id>            Unsubscribe (deletes the podcast if nobody else follows it)
  podcasts                       List subscribed podcasts
  episodes [podcast-id] [--hide-completed] [--oldest]
                                 List episodes with completion state
  toggle <episode-id>            Toggle an episode's completed flag
  complete-all [podcast-id]      Mark episodes completed
  incomplete-all [podcast-id]    Mark episodes not completed
  stats <podcast-id>             Completed / total episodes for a podcast
  refresh-due                    Refresh every podcast that went stale, then exit
  watch                          Keep refreshing stale podcasts until interrupted";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add(String),
    Refresh(i64),
    Remove(i64),
    Podcasts,
    Episodes(EpisodeArgs),
    Toggle(i64),
    CompleteAll(Option<i64>),
    IncompleteAll(Option<i64>),
    Stats(i64),
    RefreshDue,
    Watch,
    Help,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpisodeArgs {
    pub podcast_id: Option<i64>,
    pub hide_completed: bool,
    pub oldest_first: bool,
}

impl From<EpisodeArgs> for EpisodeFilter {
    fn from(args: EpisodeArgs) -> Self {
        EpisodeFilter {
            podcast_id: args.podcast_id,
            hide_completed: args.hide_completed,
            order: if args.oldest_first {
                EpisodeOrder::Oldest
            } else {
                EpisodeOrder::Newest
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub user_id: Option<i64>,
    pub command: Command,
}

/// Parse the process arguments, without the program name.
pub fn parse_args<I, T>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let mut user_id = None;
    let mut rest = Vec::new();

    let mut args = args.into_iter().map(Into::into);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--user" | "-u" => {
                let value = args.next().ok_or_else(|| usage_error("--user needs a value"))?;
                user_id = Some(parse_id(&value)?);
            }
            "--help" | "-h" => {
                return Ok(Invocation {
                    user_id,
                    command: Command::Help,
                })
            }
            _ => rest.push(arg),
        }
    }

    let mut rest = rest.into_iter();
    let command = match rest.next().as_deref() {
        None | Some("help") => Command::Help,
        Some("add") => Command::Add(required(rest.next(), "add needs a feed URL")?),
        Some("refresh") => {
            Command::Refresh(required_id(rest.next(), "refresh needs a podcast id")?)
        }
        Some("remove") => Command::Remove(required_id(rest.next(), "remove needs a podcast id")?),
        Some("podcasts") => Command::Podcasts,
        Some("episodes") => {
            let mut episode_args = EpisodeArgs::default();
            for arg in rest.by_ref() {
                match arg.as_str() {
                    "--hide-completed" => episode_args.hide_completed = true,
                    "--oldest" => episode_args.oldest_first = true,
                    other => episode_args.podcast_id = Some(parse_id(other)?),
                }
            }
            Command::Episodes(episode_args)
        }
        Some("toggle") => Command::Toggle(required_id(rest.next(), "toggle needs an episode id")?),
        Some("complete-all") => Command::CompleteAll(optional_id(rest.next())?),
        Some("incomplete-all") => Command::IncompleteAll(optional_id(rest.next())?),
        Some("stats") => Command::Stats(required_id(rest.next(), "stats needs a podcast id")?),
        Some("refresh-due") => Command::RefreshDue,
        Some("watch") => Command::Watch,
        Some(other) => return Err(usage_error(&format!("unknown command {other:?}"))),
    };

    if let Some(extra) = rest.next() {
        return Err(usage_error(&format!("unexpected argument {extra:?}")));
    }

    Ok(Invocation { user_id, command })
}

fn required(value: Option<String>, message: &str) -> Result<String> {
    value.ok_or_else(|| usage_error(message))
}

fn required_id(value: Option<String>, message: &str) -> Result<i64> {
    parse_id(&required(value, message)?)
}

fn optional_id(value: Option<String>) -> Result<Option<i64>> {
    value.as_deref().map(parse_id).transpose()
}

fn parse_id(value: &str) -> Result<i64> {
    value
        .parse()
        .map_err(|_| usage_error(&format!("{value:?} is not a valid id")))
}

fn usage_error(message: &str) -> AppError {
    anyhow::anyhow!("{}\n\n{}", message, USAGE).into()
}
