use {
  clap::Parser,
  meshrelay::relay::{Config, ConfigError},
  std::{path::PathBuf, time::Duration},
};

#[derive(Debug, Parser)]
#[clap(version, about)]
pub struct CliOpts {
  #[clap(
    short,
    long,
    parse(from_occurrences),
    help = "Use verbose output (-vv very verbose output)"
  )]
  pub verbose: u64,

  #[clap(long, parse(from_os_str), help = "path to a JSON relay config file")]
  config: Option<PathBuf>,

  #[clap(long, help = "pubsub topic to join, overrides the config file")]
  topic: Option<String>,

  #[clap(
    long,
    help = "content topic of the messages published by this node",
    default_value = "/meshrelay/1/demo/proto"
  )]
  pub content_topic: String,

  #[clap(
    long,
    help = "number of simulated peers subscribed to the topic",
    default_value = "24"
  )]
  pub peers: usize,

  #[clap(
    long,
    help = "fraction of simulated peers reached through outbound connections",
    default_value = "0.25"
  )]
  outbound: f64,

  #[clap(
    long,
    help = "stop after this many seconds, runs until Ctrl-C if omitted"
  )]
  duration: Option<u64>,

  #[clap(long, help = "seed for peer scores and mesh selection")]
  pub seed: Option<u64>,
}

impl CliOpts {
  /// Reads the relay config from the path provided by the user, or the
  /// default config if none is given. Command line values take precedence
  /// over values from the file.
  pub fn config(&self) -> Result<Config, ConfigError> {
    let mut config = match &self.config {
      Some(path) => Config::from_file(path)?,
      None => Config::default(),
    };

    if let Some(topic) = &self.topic {
      config.pubsub_topic = topic.clone();
    }

    Ok(config)
  }

  pub fn outbound(&self) -> f64 {
    self.outbound.clamp(0.0, 1.0)
  }

  pub fn duration(&self) -> Option<Duration> {
    self.duration.map(Duration::from_secs)
  }
}
