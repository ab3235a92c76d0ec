// Copyright (C) 2025-2026 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of agora.
//
// agora is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// agora is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with agora.  If not, see
// <http://www.gnu.org/licenses/>.

//! # agorac
//!
//! [agorac](crate) (the agora client) drives the [agora] forum layer from the command line: list
//! & read threads, open them, reply, like, and (for admins) moderate. One sub-command per
//! operation; identity comes from configuration rather than an interactive sign-in, since the
//! anticipated use is scripts & a human poking at their own forum.

use std::{
    ffi::OsStr,
    fs::{self},
    io::{self},
    path::PathBuf,
    result::Result as StdResult,
    sync::Arc,
};

use clap::{
    crate_authors, crate_version, parser::ValueSource, value_parser, Arg, ArgAction, Command,
};
use secrecy::SecretString;
use serde::Deserialize;
use snafu::{Backtrace, IntoError, OptionExt, ResultExt, Snafu};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
use url::Url;

use agora::{
    agora::Agora,
    authn::{self, IdentityProvider, Preconfigured, Session},
    entities::{ThreadId, ThreadStatus, UserEmail, UserId},
    forum, likes, moderation,
    postgrest::PostgRest,
    profiles,
    retry::RetryParameters,
    views,
};

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       module Error type                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Snafu)]
enum Error {
    #[snafu(display("While establishing your session, {source}"))]
    Authn { source: agora::authn::Error },
    #[snafu(display("While setting up the store client, {source}"))]
    Backend { source: agora::postgrest::Error },
    #[snafu(display("While attempting to read {path:?}, {source}"))]
    BadConfig {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("\"{text}\" isn't a valid id: {source}"))]
    BadId {
        text: String,
        source: uuid::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("While parsing the configuration file, {source}"))]
    Config {
        source: toml::de::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("While deleting a thread, {source}"))]
    Delete { source: agora::moderation::Error },
    #[snafu(display(
        "Your email must be specified, either in config or on the command line"
    ))]
    Email,
    #[snafu(display("While toggling a like, {source}"))]
    Like { source: agora::likes::Error },
    #[snafu(display("No sub-command given; try --help"))]
    NoSubCommand,
    #[snafu(display("While opening a thread, {source}"))]
    Post { source: agora::forum::Error },
    #[snafu(display("While checking whether you'd liked a thread, {source}"))]
    Probe { source: agora::likes::Error },
    #[snafu(display("While replying, {source}"))]
    Reply { source: agora::forum::Error },
    #[snafu(display(
        "The service URL must be specified, either in config or on the command line"
    ))]
    Service,
    #[snafu(display(
        "The service key must be specified, either in config or on the command line"
    ))]
    ServiceKey,
    #[snafu(display("While changing a user's admin bit, {source}"))]
    SetAdmin { source: agora::moderation::Error },
    #[snafu(display("While changing a thread's status, {source}"))]
    SetStatus { source: agora::forum::Error },
    #[snafu(display("While overriding a thread's status, {source}"))]
    SetStatusForcibly { source: agora::moderation::Error },
    #[snafu(display("While changing your username, {source}"))]
    SetUsername { source: agora::profiles::Error },
    #[snafu(display("While fetching a thread, {source}"))]
    Show { source: agora::views::Error },
    #[snafu(display("Failed to setup the tracing global subscriber: {source}"))]
    Subscriber {
        source: tracing::dispatcher::SetGlobalDefaultError,
        backtrace: Backtrace,
    },
    #[snafu(display("While fetching the front page, {source}"))]
    Threads { source: agora::views::Error },
    #[snafu(display(
        "Your user id must be specified, either in config or on the command line"
    ))]
    User,
    #[snafu(display("While listing users, {source}"))]
    Users { source: agora::moderation::Error },
    #[snafu(display("While fetching your profile, {source}"))]
    Whoami { source: agora::profiles::Error },
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(f, "{self}")
    }
}

type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         configuration                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Current configuration
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigV1 {
    // These four may be given both in config and on the command line
    pub service: Option<Url>,
    #[serde(rename = "api-key")]
    pub api_key: Option<SecretString>,
    #[serde(rename = "user-id")]
    pub user_id: Option<UserId>,
    pub email: Option<UserEmail>,
    /// Backoff & retry settings for everything that goes over the wire
    #[serde(default)]
    pub retry: RetryParameters,
}

impl ConfigV1 {
    pub fn set_service(self, service: Option<&Url>) -> Self {
        match service {
            Some(service) => ConfigV1 {
                service: Some(service.clone()),
                ..self
            },
            None => self,
        }
    }
    pub fn set_api_key(self, api_key: Option<&SecretString>) -> Self {
        match api_key {
            Some(api_key) => ConfigV1 {
                api_key: Some(api_key.clone()),
                ..self
            },
            None => self,
        }
    }
    pub fn set_user_id(self, user_id: Option<&UserId>) -> Self {
        match user_id {
            Some(user_id) => ConfigV1 {
                user_id: Some(*user_id),
                ..self
            },
            None => self,
        }
    }
    pub fn set_email(self, email: Option<&UserEmail>) -> Self {
        match email {
            Some(email) => ConfigV1 {
                email: Some(email.clone()),
                ..self
            },
            None => self,
        }
    }
    pub fn service(&self) -> Option<&Url> {
        self.service.as_ref()
    }
    pub fn api_key(&self) -> Option<&SecretString> {
        self.api_key.as_ref()
    }
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }
    pub fn email(&self) -> Option<&UserEmail> {
        self.email.as_ref()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "version", deny_unknown_fields)] // tag "internally"
enum Configuration {
    #[serde(rename = "1")]
    V1(ConfigV1),
}

impl Configuration {
    pub fn set_service(self, service: Option<&Url>) -> Self {
        match self {
            Configuration::V1(config_v1) => Configuration::V1(config_v1.set_service(service)),
        }
    }
    pub fn set_api_key(self, api_key: Option<&SecretString>) -> Self {
        match self {
            Configuration::V1(config_v1) => Configuration::V1(config_v1.set_api_key(api_key)),
        }
    }
    pub fn set_user_id(self, user_id: Option<&UserId>) -> Self {
        match self {
            Configuration::V1(config_v1) => Configuration::V1(config_v1.set_user_id(user_id)),
        }
    }
    pub fn set_email(self, email: Option<&UserEmail>) -> Self {
        match self {
            Configuration::V1(config_v1) => Configuration::V1(config_v1.set_email(email)),
        }
    }
    pub fn service(&self) -> Option<&Url> {
        match self {
            Configuration::V1(config_v1) => config_v1.service(),
        }
    }
    pub fn api_key(&self) -> Option<&SecretString> {
        match self {
            Configuration::V1(config_v1) => config_v1.api_key(),
        }
    }
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Configuration::V1(config_v1) => config_v1.user_id(),
        }
    }
    pub fn email(&self) -> Option<&UserEmail> {
        match self {
            Configuration::V1(config_v1) => config_v1.email(),
        }
    }
    pub fn retry(&self) -> &RetryParameters {
        match self {
            Configuration::V1(config_v1) => &config_v1.retry,
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration::V1(ConfigV1::default())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            helpers                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

fn thread_id(text: &str) -> Result<ThreadId> {
    ThreadId::from_raw_string(text).context(BadIdSnafu { text })
}

fn user_id(text: &str) -> Result<UserId> {
    UserId::from_raw_string(text).context(BadIdSnafu { text })
}

/// Establish the session for sub-commands that need one; browsing doesn't
///
/// Identity is fixed at configuration-time, so the provider here is [Preconfigured]; the dance
/// through [IdentityProvider::current] & [authn::require] is nonetheless the real protocol.
async fn sign_in(cfg: &Configuration) -> Result<Session> {
    let user = cfg.user_id().context(UserSnafu)?;
    let email = cfg.email().context(EmailSnafu)?;
    let provider = Preconfigured::new(Session::new(user, email.clone()));
    let session = provider.current().await.context(AuthnSnafu)?;
    authn::require(session.as_ref())
        .map(Session::clone)
        .context(AuthnSnafu)
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                              main                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("agorac")
        .version(crate_version!())
        .author(crate_authors!())
        .about("The agora client")
        .long_about(
            "Command-line client for an agora discussion forum.

Reading (the 'threads' & 'show' sub-commands) needs only the service URL & key. Everything
else acts as *you*, so your user id & email need to be configured, too (most conveniently in
the configuration file).",
        )
        .arg(
            Arg::new("service")
                .short('A')
                .long("service")
                .num_args(1)
                .value_parser(value_parser!(Url))
                .env("AGORAC_SERVICE")
                .help("Specify the forum's REST root (https://{project}.supabase.co/rest/v1/, for a hosted project)")
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .num_args(1)
                .value_parser(value_parser!(PathBuf))
                .default_value(OsStr::new("/home/mgh/.agorac.toml"))
                .env("AGORAC_CONFIG")
                .help("Specify the path to the configuration file")
        )
        .arg(
            Arg::new("no-default-config")
                .short('C')
                .long("no-default-config")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .help("Don't look for a configuration file at the default location")
        )
        .arg(
            Arg::new("api-key")
                .short('k')
                .long("api-key")
                .num_args(1)
                .value_parser(value_parser!(SecretString))
                .env("AGORAC_API_KEY")
                .help("The service key to be used for authentication")
        )
        .arg(
            Arg::new("user-id")
                .short('u')
                .long("user-id")
                .num_args(1)
                .value_parser(value_parser!(String))
                .env("AGORAC_USER")
                .help("Your user id (a UUID)")
        )
        .arg(
            Arg::new("email")
                .short('m')
                .long("email")
                .num_args(1)
                .value_parser(value_parser!(UserEmail))
                .env("AGORAC_EMAIL")
                .help("Your email address")
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .help("produce more prolix output"),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .help("produce debug output"),
        )
        .subcommand(
            Command::new("threads")
                .about("List threads, newest first")
                .arg(
                    Arg::new("search")
                        .short('s')
                        .long("search")
                        .required(false)
                        .num_args(1)
                        .value_parser(value_parser!(String))
                        .help("Only show threads whose title or description contains this text (case-insensitive)"),
                ),
        )
        .subcommand(
            Command::new("show")
                .about("Show one thread & its replies")
                .arg(
                    Arg::new("THREAD")
                        .required(true)
                        .value_parser(value_parser!(String))
                        .index(1)
                        .help("The thread's id"),
                ),
        )
        .subcommand(
            Command::new("post")
                .about("Open a new thread")
                .arg(
                    Arg::new("title")
                        .short('T')
                        .long("title")
                        .required(true)
                        .num_args(1)
                        .value_parser(value_parser!(String))
                        .help("Title for the new thread"),
                )
                .arg(
                    Arg::new("description")
                        .short('D')
                        .long("description")
                        .required(true)
                        .num_args(1)
                        .value_parser(value_parser!(String))
                        .help("Body text for the new thread"),
                )
                .arg(
                    Arg::new("tags")
                        .short('t')
                        .long("tags")
                        .required(false)
                        .num_args(1)
                        .value_parser(value_parser!(String))
                        .help("Tags for the new thread, comma-separated")
                        .long_help("Tags for the new thread, as one comma-separated field (\"rust,forums, help\"). Whitespace around each tag is trimmed & empty entries are dropped."),
                ),
        )
        .subcommand(
            Command::new("reply")
                .about("Reply to a thread")
                .arg(
                    Arg::new("THREAD")
                        .required(true)
                        .value_parser(value_parser!(String))
                        .index(1)
                        .help("The thread's id"),
                )
                .arg(
                    Arg::new("CONTENT")
                        .required(true)
                        .value_parser(value_parser!(String))
                        .num_args(1..)
                        .index(2)
                        .help("The reply text; multiple arguments are joined with spaces"),
                ),
        )
        .subcommand(
            Command::new("status")
                .about("Change a thread's status")
                .long_about(
                    "Change a thread's status. The thread must be yours, unless you're an
administrator & give --force.",
                )
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .num_args(0)
                        .action(ArgAction::SetTrue)
                        .help("Override the status of a thread you don't own (admins only)"),
                )
                .arg(
                    Arg::new("THREAD")
                        .required(true)
                        .value_parser(value_parser!(String))
                        .index(1)
                        .help("The thread's id"),
                )
                .arg(
                    Arg::new("STATUS")
                        .required(true)
                        .value_parser(value_parser!(ThreadStatus))
                        .index(2)
                        .help("One of open, closed or solved"),
                ),
        )
        .subcommand(
            Command::new("like")
                .about("Like a thread, or take your like back")
                .arg(
                    Arg::new("THREAD")
                        .required(true)
                        .value_parser(value_parser!(String))
                        .index(1)
                        .help("The thread's id"),
                ),
        )
        .subcommand(
            Command::new("delete")
                .about("Delete a thread, its replies & its likes (admins only)")
                .arg(
                    Arg::new("THREAD")
                        .required(true)
                        .value_parser(value_parser!(String))
                        .index(1)
                        .help("The thread's id"),
                ),
        )
        .subcommand(Command::new("users").about("List all users (admins only)"))
        .subcommand(
            Command::new("set-admin")
                .about("Grant or revoke a user's admin bit (admins only)")
                .arg(
                    Arg::new("USER")
                        .required(true)
                        .value_parser(value_parser!(String))
                        .index(1)
                        .help("The user's id"),
                )
                .arg(
                    Arg::new("ADMIN")
                        .required(true)
                        .value_parser(value_parser!(bool))
                        .index(2)
                        .help("true to grant, false to revoke"),
                ),
        )
        .subcommand(Command::new("whoami").about("Show your profile, creating it if need be"))
        .subcommand(
            Command::new("set-username")
                .about("Change your display name")
                .arg(
                    Arg::new("NAME")
                        .required(true)
                        .value_parser(value_parser!(String))
                        .index(1)
                        .help("The new display name"),
                ),
        )
        .get_matches();

    // Alright-- if we're here, we've parsed our command line arguments. Start by configuring
    // tracing:
    tracing::subscriber::set_global_default(
        Registry::default()
            .with(
                EnvFilter::builder()
                    .with_default_directive(
                        match (matches.get_flag("debug"), matches.get_flag("verbose")) {
                            (true, _) => Level::TRACE.into(),
                            (false, true) => Level::DEBUG.into(),
                            _ => Level::INFO.into(),
                        },
                    )
                    .from_env_lossy()
                    // reqwest & its underlings chatter at DEBUG; nobody running *this* program
                    // wants that unless they asked for it in RUST_LOG.
                    .add_directive("hyper_util=info".parse().unwrap(/* known good */))
                    .add_directive("reqwest=info".parse().unwrap(/* known good */)),
            )
            .with(
                fmt::Layer::default()
                    .compact()
                    .without_time()
                    .with_level(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_target(false),
            ),
    )
    .context(SubscriberSnafu)?;

    // Next-up: configuration
    let mut cfg = if matches.get_flag("no-default-config") {
        Configuration::default()
    } else {
        let path = matches.get_one::<PathBuf>("config").unwrap(/* known good */);
        match fs::read_to_string(path) {
            Ok(config_text) => toml::from_str(&config_text).context(ConfigSnafu)?,
            Err(err) => match (err.kind(), matches.value_source("config")) {
                (io::ErrorKind::NotFound, Some(ValueSource::DefaultValue)) => {
                    Configuration::default()
                }
                _ => {
                    return Err(BadConfigSnafu {
                        path: path.to_path_buf(),
                    }
                    .into_error(err));
                }
            },
        }
    };

    // Patch-up our configuration, if we got any of these on the command line:
    cfg = cfg.set_service(matches.get_one::<Url>("service"));
    cfg = cfg.set_api_key(matches.get_one::<SecretString>("api-key"));
    let user = matches
        .get_one::<String>("user-id")
        .map(|text| user_id(text))
        .transpose()?;
    cfg = cfg.set_user_id(user.as_ref());
    cfg = cfg.set_email(matches.get_one::<UserEmail>("email"));

    let backend = PostgRest::new(
        cfg.service().context(ServiceSnafu)?.clone(),
        cfg.api_key().context(ServiceKeySnafu)?.clone(),
    )
    .context(BackendSnafu)?;
    let state = Agora::new(Arc::new(backend), cfg.retry().clone());

    match matches.subcommand() {
        Some(("threads", matches)) => {
            let page = views::front_page(
                &state,
                matches.get_one::<String>("search").map(|s| s.as_str()),
            )
            .await
            .context(ThreadsSnafu)?;
            for view in &page {
                println!(
                    "{} [{}] {} by {} ({} like{})",
                    view.thread.id,
                    view.thread.status,
                    view.thread.title,
                    view.author,
                    view.likes,
                    plural(view.likes)
                );
            }
            Ok(())
        }
        Some(("show", matches)) => {
            let id = thread_id(matches.get_one::<String>("THREAD").unwrap(/* impossible */))?;
            let view = views::thread_detail(&state, id).await.context(ShowSnafu)?;
            println!("{} [{}]", view.thread.title, view.thread.status);
            println!(
                "opened {} by {}; {} like{}",
                view.thread.created_at.format("%Y-%m-%d %H:%M UTC"),
                view.author,
                view.likes,
                plural(view.likes)
            );
            if !view.thread.tags.is_empty() {
                println!("tags: {}", view.thread.tags.join(", "));
            }
            if cfg.user_id().is_some() && cfg.email().is_some() {
                let session = sign_in(&cfg).await?;
                let liked = likes::liked_by(&state, &session, id)
                    .await
                    .context(ProbeSnafu)?;
                println!("liked by you: {}", if liked { "yes" } else { "no" });
            }
            println!();
            println!("{}", view.thread.description);
            let replies = views::replies_for(&state, id).await.context(ShowSnafu)?;
            for reply in &replies {
                println!();
                println!(
                    "{} at {}:",
                    reply.author,
                    reply.reply.created_at.format("%Y-%m-%d %H:%M UTC")
                );
                println!("  {}", reply.reply.content);
            }
            Ok(())
        }
        Some(("post", matches)) => {
            let session = sign_in(&cfg).await?;
            let thread = forum::create_thread(
                &state,
                &session,
                matches.get_one::<String>("title").unwrap(/* impossible */),
                matches.get_one::<String>("description").unwrap(/* impossible */),
                matches
                    .get_one::<String>("tags")
                    .map(|s| s.as_str())
                    .unwrap_or(""),
            )
            .await
            .context(PostSnafu)?;
            println!("Opened {}.", thread.id);
            Ok(())
        }
        Some(("reply", matches)) => {
            let id = thread_id(matches.get_one::<String>("THREAD").unwrap(/* impossible */))?;
            let session = sign_in(&cfg).await?;
            let content = matches
                .get_many::<String>("CONTENT")
                .unwrap(/* impossible */)
                .cloned()
                .collect::<Vec<_>>()
                .join(" ");
            let reply = forum::submit_reply(&state, &session, id, &content)
                .await
                .context(ReplySnafu)?;
            println!("Replied {}.", reply.id);
            Ok(())
        }
        Some(("status", matches)) => {
            let id = thread_id(matches.get_one::<String>("THREAD").unwrap(/* impossible */))?;
            let status = *matches.get_one::<ThreadStatus>("STATUS").unwrap(/* impossible */);
            let session = sign_in(&cfg).await?;
            if matches.get_flag("force") {
                moderation::override_status(&state, &session, id, status)
                    .await
                    .context(SetStatusForciblySnafu)?;
            } else {
                // The ownership check wants the record in hand
                let view = views::thread_detail(&state, id).await.context(ShowSnafu)?;
                forum::set_status(&state, &session, &view.thread, status)
                    .await
                    .context(SetStatusSnafu)?;
            }
            println!("{} is now {}.", id, status);
            Ok(())
        }
        Some(("like", matches)) => {
            let id = thread_id(matches.get_one::<String>("THREAD").unwrap(/* impossible */))?;
            let session = sign_in(&cfg).await?;
            let outcome = likes::toggle(&state, &session, id)
                .await
                .context(LikeSnafu)?;
            println!(
                "{}: {} ({} like{})",
                id,
                if outcome.liked { "liked" } else { "unliked" },
                outcome.likes,
                plural(outcome.likes)
            );
            Ok(())
        }
        Some(("delete", matches)) => {
            let id = thread_id(matches.get_one::<String>("THREAD").unwrap(/* impossible */))?;
            let session = sign_in(&cfg).await?;
            moderation::delete_thread(&state, &session, id)
                .await
                .context(DeleteSnafu)?;
            println!("Deleted {}.", id);
            Ok(())
        }
        Some(("users", _matches)) => {
            let session = sign_in(&cfg).await?;
            let users = moderation::list_users(&state, &session)
                .await
                .context(UsersSnafu)?;
            for user in &users {
                println!(
                    "{} {} <{}>{}",
                    user.id,
                    user.username,
                    user.email,
                    if user.is_admin { " (admin)" } else { "" }
                );
            }
            Ok(())
        }
        Some(("set-admin", matches)) => {
            let user = user_id(matches.get_one::<String>("USER").unwrap(/* impossible */))?;
            let admin = *matches.get_one::<bool>("ADMIN").unwrap(/* impossible */);
            let session = sign_in(&cfg).await?;
            moderation::set_admin(&state, &session, user, admin)
                .await
                .context(SetAdminSnafu)?;
            println!(
                "{} is {} an administrator.",
                user,
                if admin { "now" } else { "no longer" }
            );
            Ok(())
        }
        Some(("whoami", _matches)) => {
            let session = sign_in(&cfg).await?;
            let profile = profiles::ensure_profile(&state, &session)
                .await
                .context(WhoamiSnafu)?;
            println!("{} <{}>", profile.username, profile.email);
            println!("id: {}", profile.id);
            if profile.is_admin {
                println!("You are an administrator.");
            }
            Ok(())
        }
        Some(("set-username", matches)) => {
            let session = sign_in(&cfg).await?;
            let username = profiles::update_username(
                &state,
                &session,
                matches.get_one::<String>("NAME").unwrap(/* impossible */),
            )
            .await
            .context(SetUsernameSnafu)?;
            println!("You are now {username}.");
            Ok(())
        }
        Some(_) => unimplemented!(/* impossible */),
        None => NoSubCommandSnafu.fail(),
    }
}
