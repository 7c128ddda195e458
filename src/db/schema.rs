/// Idempotent schema, applied on every start.
///
/// Snowflakes are TEXT, timestamps are unix milliseconds.
pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        user_id TEXT NOT NULL,
        guild_id TEXT NOT NULL,
        points INTEGER NOT NULL DEFAULT 0 CHECK (points >= 0),
        daily_streak INTEGER NOT NULL DEFAULT 0,
        last_daily INTEGER,
        last_roll INTEGER,
        xp INTEGER NOT NULL DEFAULT 0,
        level INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (user_id, guild_id)
    );
    CREATE INDEX IF NOT EXISTS idx_users_guild_points ON users (guild_id, points DESC);

    CREATE TABLE IF NOT EXISTS ads (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        guild_id TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        message_ids TEXT NOT NULL DEFAULT '[]',
        channels_posted_in TEXT NOT NULL DEFAULT '[]',
        cost INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'active',
        was_booster BOOLEAN NOT NULL DEFAULT FALSE,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_ads_guild_time ON ads (guild_id, created_at DESC);
    CREATE INDEX IF NOT EXISTS idx_ads_user_guild_time ON ads (user_id, guild_id, created_at DESC);

    CREATE TABLE IF NOT EXISTS suggestions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        message_id TEXT NOT NULL UNIQUE,
        thread_id TEXT NOT NULL UNIQUE,
        user_id TEXT NOT NULL,
        guild_id TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        upvotes INTEGER NOT NULL DEFAULT 0,
        downvotes INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS warnings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        guild_id TEXT NOT NULL,
        moderator_id TEXT NOT NULL,
        reason TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_warnings_user ON warnings (guild_id, user_id, expires_at);

    CREATE TABLE IF NOT EXISTS mutes (
        guild_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        reason TEXT NOT NULL,
        moderator_id TEXT NOT NULL,
        duration_hours INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL,
        PRIMARY KEY (guild_id, user_id)
    );

    CREATE TABLE IF NOT EXISTS ticket_closures (
        channel_id TEXT PRIMARY KEY,
        guild_id TEXT NOT NULL,
        close_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS ticket_alerts (
        channel_id TEXT PRIMARY KEY,
        guild_id TEXT NOT NULL,
        alert_message_id TEXT NOT NULL,
        requested_by TEXT NOT NULL,
        close_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS bans (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        guild_id TEXT NOT NULL,
        moderator_id TEXT NOT NULL,
        reason TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS link_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        guild_id TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );
";
