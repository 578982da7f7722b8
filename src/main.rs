use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

use feedline::api::auth::{CommandCredential, EnvCredential};
use feedline::api::types::{CreatePostRequest, Post};
use feedline::api::users;
use feedline::config::{Config, TOKEN_ENV};
use feedline::endpoint::Platform;
use feedline::{logging, PostFeed, Session};

#[derive(Parser, Debug)]
#[command(name = "feedline")]
#[command(about = "Command-line client for the feedline social feed")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/feedline/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Platform used to pick the default API address (android, ios, other)
  #[arg(long, global = true)]
  platform: Option<Platform>,

  /// Work on this user's posts instead of the global feed
  #[arg(short, long, global = true)]
  user: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print the resolved API base address
  Endpoint,
  /// List posts
  Feed,
  /// Like or unlike a post
  Like { post_id: String },
  /// Delete a post
  Delete { post_id: String },
  /// Create a post
  Post {
    #[arg(default_value = "")]
    content: String,
    /// Image URL to attach
    #[arg(long)]
    image: Option<String>,
  },
  /// Comment on a post
  Comment { post_id: String, content: String },
  /// Show the signed-in user
  Me,
  /// Create or refresh the backend record for the signed-in user
  Sync,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Override platform if specified on command line
  if let Some(platform) = args.platform {
    config.api.platform = Some(platform);
  }

  let _log_guard = logging::init(&config.log)?;

  let session = match config.auth.token_command.clone() {
    Some(command) => Session::new(&config, CommandCredential::new(command))?,
    None => Session::new(&config, EnvCredential::new(TOKEN_ENV))?,
  };
  let feed = session.feed(args.user.as_deref());

  match args.command {
    Command::Endpoint => println!("{}", session.base_address()),
    Command::Feed => print_feed(&feed).await?,
    Command::Like { post_id } => {
      feed.toggle_like(&post_id).await?;
      print_feed(&feed).await?;
    }
    Command::Delete { post_id } => {
      feed.delete_post(&post_id).await?;
      print_feed(&feed).await?;
    }
    Command::Post { content, image } => {
      feed.create_post(CreatePostRequest::new(content, image)?).await?;
      print_feed(&feed).await?;
    }
    Command::Comment { post_id, content } => {
      feed.add_comment(&post_id, &content).await?;
      print_feed(&feed).await?;
    }
    Command::Me => {
      let me = users::current_user(session.api()).await?.user;
      println!("{} ({})", me.username, me.id);
      for (label, value) in [
        ("name", full_name(me.first_name.as_deref(), me.last_name.as_deref())),
        ("email", me.email),
        ("bio", me.bio),
        ("location", me.location),
      ] {
        if let Some(value) = value {
          println!("  {:<9}{}", label, value);
        }
      }
    }
    Command::Sync => {
      let ack = users::sync_user(session.api()).await?;
      println!("{}", ack.message.as_deref().unwrap_or("User synced"));
    }
  }

  Ok(())
}

async fn print_feed(feed: &PostFeed) -> Result<()> {
  let posts = feed.posts().await?;
  if posts.is_empty() {
    println!("No posts yet ({})", feed.key().description());
    return Ok(());
  }
  for post in &posts {
    print_post(post);
  }
  Ok(())
}

fn print_post(post: &Post) {
  let when = post
    .created_at
    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
    .unwrap_or_default();
  println!(
    "{}  @{}  {}  {} likes  {} comments",
    post.id,
    post.user.username,
    when,
    post.like_count(),
    post.comments.len()
  );
  if !post.content.is_empty() {
    println!("    {}", post.content);
  }
  if let Some(image) = &post.image {
    println!("    [image] {}", image);
  }
}

fn full_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
  let name = [first, last]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ");
  (!name.is_empty()).then_some(name)
}
