use clap::{Parser, Subcommand};
use comicbase::config::Config;
use comicbase::models::db_operations::users_db_operations;
use comicbase::models::Role;
use comicbase::setup::db_setup;
use redb::Database;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "setup_cli", author, version, about = "A CLI for initial application setup.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    /// Creates the users database, the comics database, or both.
    Setup {
        db_type: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    List,
    ChangePassword {
        #[arg(long)]
        email: String,
        #[arg(long)]
        new_password: String,
    },
    /// Blocks an account from logging in without deleting it.
    Disable {
        #[arg(long)]
        email: String,
    },
    Enable {
        #[arg(long)]
        email: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env(&cli.env_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load or parse configuration: {}", e);
            std::process::exit(1);
        }
    };

    match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup { db_type } => match db_type.as_deref() {
                Some("users") => setup_users_database(&config),
                Some("comics") => setup_comics_database(&config),
                Some(other) => eprintln!("❌ Error: Unknown database type '{}'. Use 'users' or 'comics'.", other),
                None => {
                    setup_users_database(&config);
                    setup_comics_database(&config);
                }
            },
        },
        Commands::Admin { action } => match action {
            AdminAction::Create { email, password } => create_admin_user(&config, email, password),
            AdminAction::List => list_users(&config),
            AdminAction::ChangePassword { email, new_password } => change_password(&config, email, new_password),
            AdminAction::Disable { email } => set_active(&config, email, false),
            AdminAction::Enable { email } => set_active(&config, email, true),
        },
    }
}

fn ensure_parent(path: &Path) -> bool {
    match path.parent().map(fs::create_dir_all) {
        Some(Err(e)) => {
            eprintln!("❌ Could not create database directory for '{}': {}", path.display(), e);
            false
        }
        _ => true,
    }
}

fn setup_users_database(config: &Config) {
    let db_path = config.users_db_path();
    if db_path.exists() {
        println!("ℹ️ Users database already exists at '{}'. Skipping creation.", db_path.display());
        return;
    }
    println!("\nSetting up users database at '{}'...", db_path.display());
    if !ensure_parent(&db_path) {
        return;
    }

    let mut conn = match Connection::open(&db_path) {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("❌ Could not create users database file: {}", e);
            return;
        }
    };
    match db_setup::setup_users_db(&mut conn) {
        Ok(_) => println!("✅ Users database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up users database: {}", e),
    }
}

fn setup_comics_database(config: &Config) {
    let db_path = config.comics_db_path();
    if db_path.exists() {
        println!("ℹ️ Comics database already exists at '{}'. Skipping creation.", db_path.display());
        return;
    }
    println!("\nSetting up comics database at '{}'...", db_path.display());
    if !ensure_parent(&db_path) {
        return;
    }

    let db = match Database::create(&db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("❌ Failed to create comics database file: {}", e);
            return;
        }
    };
    match db_setup::setup_comics_db(&db) {
        Ok(_) => println!("✅ Comics database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up comics database: {}", e),
    }
}

fn open_users_db(config: &Config) -> Option<Connection> {
    let db_path = config.users_db_path();
    if !db_path.exists() {
        eprintln!(
            "❌ Error: Users database not found at '{}'. Please run `setup_cli db setup` first.",
            db_path.display()
        );
        return None;
    }
    match Connection::open(&db_path) {
        Ok(conn) => Some(conn),
        Err(e) => {
            eprintln!("❌ Could not open users database: {}", e);
            None
        }
    }
}

fn create_admin_user(config: &Config, email: &str, password: &str) {
    let Some(conn) = open_users_db(config) else { return };

    if !email.contains('@') {
        eprintln!("❌ Error: '{}' does not look like an email address.", email);
        return;
    }
    if password.len() < 8 {
        eprintln!("❌ Error: Password must be at least 8 characters long.");
        return;
    }

    match users_db_operations::create_user(&conn, email, password, Role::Admin) {
        Ok(_) => println!("✅ Admin user '{}' created successfully.", email.trim().to_lowercase()),
        Err(e) => eprintln!("❌ Error creating admin user: {}. It might be because the email already exists.", e),
    }
}

fn list_users(config: &Config) {
    let Some(conn) = open_users_db(config) else { return };

    match users_db_operations::read_all_users(&conn) {
        Ok(users) => {
            println!("Listing Users:");
            for user in users {
                println!(
                    "- {} [{}]{} last login: {}",
                    user.email,
                    user.role.as_str(),
                    if user.is_active { "" } else { " (disabled)" },
                    user.last_login_time.as_deref().unwrap_or("never")
                );
            }
        }
        Err(e) => eprintln!("❌ Error fetching users: {}", e),
    }
}

fn change_password(config: &Config, email: &str, new_password: &str) {
    let Some(conn) = open_users_db(config) else { return };

    if new_password.len() < 8 {
        eprintln!("❌ Error: Password must be at least 8 characters long.");
        return;
    }
    match users_db_operations::update_password(&conn, email, new_password) {
        Ok(0) => eprintln!("❌ Error: No user with email '{}' found.", email),
        Ok(_) => println!("✅ Password for '{}' changed successfully.", email),
        Err(e) => eprintln!("❌ Error updating password: {}", e),
    }
}

fn set_active(config: &Config, email: &str, active: bool) {
    let Some(conn) = open_users_db(config) else { return };

    match users_db_operations::set_active(&conn, email, active) {
        Ok(0) => eprintln!("❌ Error: No user with email '{}' found.", email),
        Ok(_) => println!("✅ '{}' is now {}.", email, if active { "enabled" } else { "disabled" }),
        Err(e) => eprintln!("❌ Error updating account: {}", e),
    }
}
