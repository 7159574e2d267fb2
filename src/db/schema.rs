pub const SCHEMA: &str = r#"
-- Users: owners of images and albums
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

-- Images: uploaded objects and their tags
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    storage_key TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',  -- JSON array
    uploaded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_images_owner ON images(owner_id);

-- Albums: a tag query plus a cached member set
CREATE TABLE IF NOT EXISTS albums (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',  -- JSON array
    cover_image_id INTEGER REFERENCES images(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_albums_owner ON albums(owner_id);

-- Album membership. 'manual' rows are never evicted by tag changes.
CREATE TABLE IF NOT EXISTS album_images (
    album_id INTEGER NOT NULL REFERENCES albums(id) ON DELETE CASCADE,
    image_id INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
    source TEXT NOT NULL DEFAULT 'manual' CHECK (source IN ('manual', 'tag')),
    added_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (album_id, image_id)
);

CREATE INDEX IF NOT EXISTS idx_album_images_image ON album_images(image_id);

-- Vocabulary embedding cache, one vector per label and model
CREATE TABLE IF NOT EXISTS label_embeddings (
    label TEXT NOT NULL,
    model_name TEXT NOT NULL,
    embedding BLOB NOT NULL,  -- little-endian f32
    embedding_dim INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (label, model_name)
);
"#;
