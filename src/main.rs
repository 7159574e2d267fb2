//! tagfolio: command-line front end for the gallery service.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use tagfolio::embeddings::{create_embedder, EmbeddingIndex, TextEmbedder, Vocabulary};
use tagfolio::labels::create_detector;
use tagfolio::models::{Album, Image, User};
use tagfolio::ranking::TagRanker;
use tagfolio::storage::FsObjectStore;
use tagfolio::{logging, Config, Database, Gallery};

#[derive(Parser)]
#[command(name = "tagfolio")]
#[command(author, version, about = "Tag-driven photo albums")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to config file (overrides TAGFOLIO_CONFIG and the default location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Act as this user (default: [user] default in the config)
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage user accounts
    #[command(subcommand)]
    User(UserCommand),

    /// Upload and manage images
    #[command(subcommand)]
    Image(ImageCommand),

    /// List every tag used on your images
    Tags,

    /// Manage albums
    #[command(subcommand)]
    Album(AlbumCommand),

    /// Tag usage statistics for your images
    Analytics,

    /// Browse other users' images and albums
    #[command(subcommand)]
    Explore(ExploreCommand),

    /// Label vocabulary used for prompt ranking
    #[command(subcommand)]
    Vocabulary(VocabularyCommand),
}

#[derive(Subcommand)]
enum UserCommand {
    /// Create a user
    Register { username: String },

    /// Show a profile (default: the current user)
    Show { username: Option<String> },

    /// Delete the current user with all their images and albums
    Delete {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Find users by name
    Search {
        #[arg(default_value = "")]
        query: String,
    },

    /// List another user's images
    Images { username: String },

    /// List another user's albums
    Albums { username: String },
}

#[derive(Args)]
struct TagArgs {
    /// Tags, space or comma separated
    #[arg(value_delimiter = ',')]
    tags: Vec<String>,
}

#[derive(Subcommand)]
enum ImageCommand {
    /// Upload an image and print suggested tags
    Upload {
        path: PathBuf,

        /// Stored file name (default: the file's own name)
        #[arg(short, long)]
        name: Option<String>,

        /// Confirm the suggested tags right away
        #[arg(long)]
        accept: bool,
    },

    /// Suggest tags for an image file without storing it
    Suggest { path: PathBuf },

    /// Confirm the tags of an uploaded image
    Finalize {
        id: i64,
        #[command(flatten)]
        tags: TagArgs,
    },

    /// Replace an image's tags (capitalized, at least one)
    EditTags {
        id: i64,
        #[command(flatten)]
        tags: TagArgs,
    },

    /// Rename an image
    Rename { id: i64, name: String },

    /// Delete an image
    Delete { id: i64 },

    /// List your images
    List,

    /// Show one image
    Show { id: i64 },
}

#[derive(Subcommand)]
enum AlbumCommand {
    /// Create an album
    Create {
        name: String,

        /// Cover image id (added to the album)
        #[arg(long)]
        cover: Option<i64>,
    },

    /// List your albums
    List,

    /// Show an album and its images
    Show { id: i64 },

    /// Delete an album
    Delete { id: i64 },

    /// Add images to an album
    AddImages {
        id: i64,
        #[arg(required = true, value_delimiter = ',')]
        images: Vec<i64>,
    },

    /// Remove an image from an album
    RemoveImage { id: i64, image: i64 },

    /// Set the album cover
    Cover { id: i64, image: i64 },

    /// Add tags to an album
    AddTags {
        id: i64,
        #[command(flatten)]
        tags: TagArgs,
    },

    /// Remove tags from an album
    RemoveTags {
        id: i64,
        #[command(flatten)]
        tags: TagArgs,
    },

    /// Pick album tags from a free-text prompt
    Prompt {
        id: i64,
        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ExploreCommand {
    /// Images of other users, optionally filtered by tag
    Images {
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Albums of other users, optionally filtered by name
    Albums {
        #[arg(short, long)]
        search: Option<String>,
    },
}

#[derive(Subcommand)]
enum VocabularyCommand {
    /// Embed the vocabulary and cache the vectors
    Build {
        /// Discard cached vectors for the configured model first
        #[arg(long)]
        rebuild: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_status(&e))
        }
    }
}

/// 2 when the request itself was wrong (bad input, unknown id), 1 otherwise.
fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<tagfolio::Error>() {
        Some(e) if e.is_client_error() => 2,
        _ => 1,
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Uses journald on Linux, file fallback otherwise
    if let Err(e) = logging::init(None) {
        eprintln!("Warning: logging disabled: {:#}", e);
    }

    let db = Database::open(&config.database.path)
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;

    // Building the index may embed the whole vocabulary; only prompts need it.
    let ranker = if matches!(cli.command, Commands::Album(AlbumCommand::Prompt { .. })) {
        build_ranker(&config, &db, false)?
    } else {
        None
    };

    let gallery = Gallery::new(db, Box::new(FsObjectStore::from_config(&config.storage)))
        .with_detector(create_detector(&config.labels))
        .with_ranker(ranker)
        .with_label_limits(config.labels.top_n, config.labels.min_confidence);

    let out = Output { json: cli.json };
    let username = cli.user.clone().or_else(|| config.user.default.clone());
    let current_user = || -> Result<User> {
        let name = username
            .as_deref()
            .ok_or_else(|| anyhow!("No user given: pass --user or set [user] default in the config"))?;
        Ok(gallery.user_by_name(name)?)
    };

    match cli.command {
        Commands::User(cmd) => match cmd {
            UserCommand::Register { username } => {
                let user = gallery.register_user(&username)?;
                out.user(&user)?;
            }
            UserCommand::Show { username: name } => {
                let name = match name.or_else(|| username.clone()) {
                    Some(name) => name,
                    None => return Err(anyhow!("No user given")),
                };
                let profile = gallery.profile(&name)?;
                if out.json {
                    out.print_json(&profile)?;
                } else {
                    println!(
                        "{} (id {}, joined {})\n  images: {}\n  albums: {}",
                        profile.user.username,
                        profile.user.id,
                        profile.user.created_at.format("%Y-%m-%d"),
                        profile.image_count,
                        profile.album_count
                    );
                }
            }
            UserCommand::Images { username: name } => {
                let owner = gallery.user_by_name(&name)?;
                out.images(&gallery, &gallery.user_images(owner.id)?)?;
            }
            UserCommand::Albums { username: name } => {
                let owner = gallery.user_by_name(&name)?;
                out.albums(&gallery.user_albums(owner.id)?)?;
            }
            UserCommand::Delete { yes } => {
                let user = current_user()?;
                if !yes {
                    return Err(anyhow!(
                        "Refusing to delete {} without --yes",
                        user.username
                    ));
                }
                gallery.delete_account(user.id)?;
                println!("Deleted account {}", user.username);
            }
            UserCommand::Search { query } => {
                let users = gallery.search_users(&query)?;
                if out.json {
                    out.print_json(&users)?;
                } else {
                    for user in &users {
                        println!("{}\t{}", user.id, user.username);
                    }
                }
            }
        },

        Commands::Image(cmd) => {
            let user = current_user()?;
            match cmd {
                ImageCommand::Upload { path, name, accept } => {
                    let bytes = read_image(&path)?;
                    let filename = match name {
                        Some(name) => name,
                        None => file_name(&path)?,
                    };
                    let mut upload = gallery.upload_image(user.id, &filename, &bytes)?;
                    if accept {
                        upload = gallery.accept_suggestions(upload)?;
                    }

                    if out.json {
                        out.print_json(&upload)?;
                    } else {
                        out.image(&gallery, &upload.image)?;
                        if !accept {
                            println!("suggested: {}", upload.suggested_tags.join(", "));
                        }
                    }
                }
                ImageCommand::Suggest { path } => {
                    let bytes = read_image(&path)?;
                    let suggestions = gallery.suggest_tags(&bytes)?;
                    if out.json {
                        out.print_json(&suggestions)?;
                    } else {
                        println!("{}", suggestions.join(", "));
                    }
                }
                ImageCommand::Finalize { id, tags } => {
                    let image = gallery.finalize_tags(user.id, id, &tags.tags)?;
                    out.image(&gallery, &image)?;
                }
                ImageCommand::EditTags { id, tags } => {
                    let image = gallery.edit_tags(user.id, id, &tags.tags)?;
                    out.image(&gallery, &image)?;
                }
                ImageCommand::Rename { id, name } => {
                    let image = gallery.rename_image(user.id, id, &name)?;
                    out.image(&gallery, &image)?;
                }
                ImageCommand::Delete { id } => {
                    gallery.delete_image(user.id, id)?;
                    println!("Deleted image {}", id);
                }
                ImageCommand::List => {
                    let images = gallery.list_images(user.id)?;
                    out.images(&gallery, &images)?;
                }
                ImageCommand::Show { id } => {
                    let image = gallery.image_detail(id)?;
                    out.image(&gallery, &image)?;
                }
            }
        }

        Commands::Tags => {
            let user = current_user()?;
            let tags = gallery.user_tags(user.id)?;
            if out.json {
                out.print_json(&tags)?;
            } else {
                for tag in &tags {
                    println!("{}", tag);
                }
            }
        }

        Commands::Album(cmd) => {
            let user = current_user()?;
            match cmd {
                AlbumCommand::Create { name, cover } => {
                    let album = gallery.create_album(user.id, &name, cover)?;
                    out.album(&album)?;
                }
                AlbumCommand::List => {
                    let albums = gallery.list_albums(user.id)?;
                    out.albums(&albums)?;
                }
                AlbumCommand::Show { id } => {
                    let view = gallery.album_view(id)?;
                    if out.json {
                        out.print_json(&view)?;
                    } else {
                        out.album(&view.album)?;
                        println!("  owner: {}", view.owner_username);
                        out.images(&gallery, &view.images)?;
                    }
                }
                AlbumCommand::Delete { id } => {
                    gallery.delete_album(user.id, id)?;
                    println!("Deleted album {}", id);
                }
                AlbumCommand::AddImages { id, images } => {
                    let added = gallery.add_images(user.id, id, &images)?;
                    println!("Added {} image(s) to album {}", added, id);
                }
                AlbumCommand::RemoveImage { id, image } => {
                    let album = gallery.remove_image(user.id, id, image)?;
                    out.album(&album)?;
                }
                AlbumCommand::Cover { id, image } => {
                    let album = gallery.set_cover(user.id, id, image)?;
                    out.album(&album)?;
                }
                AlbumCommand::AddTags { id, tags } => {
                    let album = gallery.add_album_tags(user.id, id, &tags.tags)?;
                    out.album(&album)?;
                }
                AlbumCommand::RemoveTags { id, tags } => {
                    let album = gallery.remove_album_tags(user.id, id, &tags.tags)?;
                    out.album(&album)?;
                }
                AlbumCommand::Prompt { id, prompt } => {
                    let update = gallery.update_album_tags_from_prompt(user.id, id, &prompt.join(" "))?;
                    if out.json {
                        out.print_json(&update)?;
                    } else {
                        out.album(&update.album)?;
                        if !update.ranking.negative.is_empty() {
                            println!("  excluded: {}", update.ranking.negative.join(", "));
                        }
                    }
                }
            }
        }

        Commands::Analytics => {
            let user = current_user()?;
            let analytics = gallery.analytics(user.id)?;
            if out.json {
                out.print_json(&analytics)?;
            } else {
                println!("{} image(s)", analytics.total_images);
                println!("top tags:");
                for (tag, count) in &analytics.top_tags {
                    println!("  {:<24} {}", tag, count);
                }
                println!("all tags:");
                for (tag, count) in &analytics.distribution {
                    println!("  {:<24} {}", tag, count);
                }
            }
        }

        Commands::Explore(cmd) => {
            let user = current_user()?;
            match cmd {
                ExploreCommand::Images { search } => {
                    let images = gallery.explore_images(user.id, search.as_deref())?;
                    out.images(&gallery, &images)?;
                }
                ExploreCommand::Albums { search } => {
                    let albums = gallery.explore_albums(user.id, search.as_deref())?;
                    out.albums(&albums)?;
                }
            }
        }

        Commands::Vocabulary(VocabularyCommand::Build { rebuild }) => {
            cmd_vocabulary_build(&config, gallery.db(), rebuild, out.json)?;
        }
    }

    Ok(())
}

/// Load the vocabulary and build the embedding index. `None` when embeddings
/// are disabled in the config.
fn build_ranker(config: &Config, db: &Database, rebuild: bool) -> Result<Option<TagRanker>> {
    let embedder: Arc<dyn TextEmbedder> = match create_embedder(&config.embeddings) {
        Some(embedder) => Arc::from(embedder),
        None => {
            tracing::info!("Embeddings disabled, prompt ranking unavailable");
            return Ok(None);
        }
    };

    if rebuild {
        let cleared = db.clear_label_embeddings(embedder.model_name())?;
        tracing::info!(model = embedder.model_name(), cleared, "Cleared cached label embeddings");
    }

    let vocabulary = Vocabulary::load_or_empty(&config.vocabulary.path);
    let index = EmbeddingIndex::build(&vocabulary, embedder.as_ref(), Some(db))?;

    Ok(Some(TagRanker::new(
        Arc::new(index),
        embedder,
        config.ranking.top_k,
    )))
}

fn cmd_vocabulary_build(config: &Config, db: &Database, rebuild: bool, json: bool) -> Result<()> {
    let ranker = build_ranker(config, db, rebuild)?
        .ok_or_else(|| anyhow!("Embeddings are disabled in the config"))?;
    let index = ranker.index();

    #[derive(Serialize)]
    struct Summary<'a> {
        model: &'a str,
        labels: usize,
        vocabulary: &'a Path,
        embedded: Vec<&'a str>,
    }

    let summary = Summary {
        model: index.model_name(),
        labels: index.len(),
        vocabulary: &config.vocabulary.path,
        embedded: index.entries().iter().map(|e| e.label.as_str()).collect(),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Embedded {} label(s) from {} with {}",
            summary.labels,
            summary.vocabulary.display(),
            summary.model
        );
    }
    Ok(())
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow!("{} has no file name", path.display()))
}

struct Output {
    json: bool,
}

impl Output {
    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn user(&self, user: &User) -> Result<()> {
        if self.json {
            return self.print_json(user);
        }
        println!("{}\t{}", user.id, user.username);
        Ok(())
    }

    fn image(&self, gallery: &Gallery, image: &Image) -> Result<()> {
        if self.json {
            return self.print_json(image);
        }
        println!(
            "{}\t{}\t[{}]\t{}",
            image.id,
            image.name,
            image.tags.join(", "),
            gallery.image_url(image)
        );
        Ok(())
    }

    fn images(&self, gallery: &Gallery, images: &[Image]) -> Result<()> {
        if self.json {
            return self.print_json(images);
        }
        for image in images {
            self.image(gallery, image)?;
        }
        Ok(())
    }

    fn album(&self, album: &Album) -> Result<()> {
        if self.json {
            return self.print_json(album);
        }
        let cover = album
            .cover_image_id
            .map(|id| format!("cover {}", id))
            .unwrap_or_else(|| "no cover".to_string());
        println!("{}\t{}\t[{}]\t{}", album.id, album.name, album.tags.join(", "), cover);
        Ok(())
    }

    fn albums(&self, albums: &[Album]) -> Result<()> {
        if self.json {
            return self.print_json(albums);
        }
        for album in albums {
            self.album(album)?;
        }
        Ok(())
    }
}
