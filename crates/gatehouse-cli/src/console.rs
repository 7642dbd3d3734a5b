//! Operator console on stdin.
//!
//! Stands in for wired readers and the admin surface when the controller
//! runs without hardware. Card swipes are encoded into Wiegand frames and
//! fed to the decoders edge by edge.

use anyhow::{Context, Result, anyhow, bail};
use gatehouse_controller::AccessController;
use gatehouse_core::{CardCode, ReaderId, RelayAction, RelayId};
use gatehouse_hardware::encode_frame;
use gatehouse_sync::CloudSink;
use std::str::FromStr;
use std::time::Instant;

/// Spacing between simulated edges, in microseconds.
const EDGE_SPACING_US: u32 = 2_000;

const DEFAULT_RECENT: usize = 10;

pub const HELP: &str = "\
commands:
  <reader> <card>                      swipe a card (also: swipe <reader> <card>)
  relay <n> normal|open_hold|close_hold
  recent [n]                           latest transactions
  counts                               today's counters
  status                               controller status as JSON
  help";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Swipe { reader: ReaderId, card: CardCode },
    Relay { relay: RelayId, action: RelayAction },
    Recent(usize),
    Counts,
    Status,
    Help,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["swipe", reader, card] | [reader, card] if reader.parse::<u8>().is_ok() => {
                Ok(Command::Swipe {
                    reader: reader.parse()?,
                    card: card.parse()?,
                })
            }
            ["relay", relay, action] => {
                let relay: u8 = relay.parse().context("relay must be a number")?;
                Ok(Command::Relay {
                    relay: RelayId::new(relay)?,
                    action: action.parse()?,
                })
            }
            ["recent"] => Ok(Command::Recent(DEFAULT_RECENT)),
            ["recent", n] => Ok(Command::Recent(n.parse().context("invalid count")?)),
            ["counts"] => Ok(Command::Counts),
            ["status"] => Ok(Command::Status),
            ["help"] | ["?"] => Ok(Command::Help),
            [] => Err(anyhow!("empty command")),
            _ => bail!("unknown command: {line:?} (try help)"),
        }
    }
}

/// Executes console commands against a controller.
pub struct Console<'a, S> {
    controller: &'a AccessController<S>,
    started: Instant,
}

impl<'a, S: CloudSink> Console<'a, S> {
    pub fn new(controller: &'a AccessController<S>) -> Self {
        Self {
            controller,
            started: Instant::now(),
        }
    }

    /// Microsecond tick counter, wrapping like a hardware timer.
    fn tick(&self) -> u32 {
        self.started.elapsed().as_micros() as u32
    }

    /// Encode `card` for `reader`'s frame length and feed it edge by edge.
    pub fn swipe(&self, reader: ReaderId, card: CardCode) -> Result<()> {
        let bits = self.controller.config().bits_for(reader);
        let frame = encode_frame(card, bits)?;
        let mut tick = self.tick();
        for line in frame.lines() {
            self.controller.on_edge(reader, line, tick);
            tick = tick.wrapping_add(EDGE_SPACING_US);
        }
        Ok(())
    }

    /// Run one command and return the text to print.
    pub async fn execute(&self, command: Command) -> Result<String> {
        match command {
            Command::Swipe { reader, card } => {
                self.swipe(reader, card)?;
                Ok(match self.controller.recent_transactions(1).first() {
                    Some(tx) if tx.card == card => {
                        format!("{} {} on reader {}", tx.status, tx.name, tx.reader)
                    }
                    _ => "no transaction recorded".to_string(),
                })
            }
            Command::Relay { relay, action } => {
                self.controller.force_relay(relay, action)?;
                Ok(format!("relay {relay}: {action:?}"))
            }
            Command::Recent(limit) => {
                let lines: Vec<String> = self
                    .controller
                    .recent_transactions(limit)
                    .iter()
                    .map(|tx| {
                        format!(
                            "{} reader {} {} {} {}",
                            tx.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            tx.reader,
                            tx.card,
                            tx.name,
                            tx.status
                        )
                    })
                    .collect();
                Ok(lines.join("\n"))
            }
            Command::Counts => {
                let c = self.controller.today_counts();
                Ok(format!(
                    "granted {} denied {} blocked {} total {}",
                    c.granted, c.denied, c.blocked, c.total
                ))
            }
            Command::Status => {
                let status = self.controller.status().await;
                Ok(serde_json::to_string_pretty(&status)?)
            }
            Command::Help => Ok(HELP.to_string()),
        }
    }
}
