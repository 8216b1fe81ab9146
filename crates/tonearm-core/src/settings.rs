//! Settings management
//!
//! Persistent settings for the facade and the engine processes it spawns.

use std::fs;
use std::path::{ Path, PathBuf };
use std::time::Duration;

use serde::{ Deserialize, Serialize };
use thiserror::Error;


/// Name of the context created by `PlaybackFacade::with_default_context`.
pub const DEFAULT_CONTEXT: &str = "default";


/// Errors that can occur while reading or writing settings.
#[derive( Debug, Error )]
pub enum SettingsError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Invalid settings file: {0}" )]
    Parse( #[from] serde_json::Error ),
}


/// Top-level settings.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Context created and selected on startup
    pub default_context: String,

    pub engine: EngineSettings,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            default_context: DEFAULT_CONTEXT.to_string(),
            engine: EngineSettings::default(),
        }
    }
}


/// How engine processes are launched and talked to.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct EngineSettings {
    /// Engine executable, looked up on PATH if not absolute
    pub mpv_path: PathBuf,

    /// Extra command-line arguments passed to every engine process
    pub extra_args: Vec<String>,

    /// Where IPC sockets are created. Falls back to the runtime or temp dir.
    pub socket_dir: Option<PathBuf>,

    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,

    /// How long a quitting engine gets before it is killed
    pub quit_grace_ms: u64,
}


impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            mpv_path: PathBuf::from( "mpv" ),
            extra_args: Vec::new(),
            socket_dir: None,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
            quit_grace_ms: 1_000,
        }
    }
}


impl EngineSettings {
    pub fn connect_timeout( &self ) -> Duration {
        Duration::from_millis( self.connect_timeout_ms )
    }


    pub fn request_timeout( &self ) -> Duration {
        Duration::from_millis( self.request_timeout_ms )
    }


    pub fn quit_grace( &self ) -> Duration {
        Duration::from_millis( self.quit_grace_ms )
    }


    /// Resolves the directory IPC sockets live in.
    pub fn resolved_socket_dir( &self ) -> PathBuf {
        self.socket_dir.clone()
            .or_else( dirs::runtime_dir )
            .unwrap_or_else( std::env::temp_dir )
    }
}


impl Settings {
    /// Returns the path to the settings file.
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "tonearm" ).join( "settings.json" ) )
    }


    /// Loads settings from the default location, or returns defaults if
    /// the file is missing or unreadable.
    pub fn load() -> Self {
        let path = match Self::settings_path() {
            Some( p ) => p,
            None => return Self::default(),
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from( &path ) {
            Ok( settings ) => settings,
            Err( e ) => {
                tracing::warn!( "Failed to read settings from {:?}: {}", path, e );
                Self::default()
            }
        }
    }


    /// Loads settings from a specific file. Missing fields take their defaults.
    pub fn load_from( path: &Path ) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string( path )?;
        Ok( serde_json::from_str( &contents )? )
    }


    /// Saves settings to the default location.
    pub fn save( &self ) -> Result<(), SettingsError> {
        match Self::settings_path() {
            Some( path ) => self.save_to( &path ),
            None => {
                tracing::warn!( "No config directory available, settings not saved" );
                Ok(())
            }
        }
    }


    /// Saves settings to a specific file, creating parent directories.
    pub fn save_to( &self, path: &Path ) -> Result<(), SettingsError> {
        if let Some( parent ) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all( parent )?;
            }
        }

        let json = serde_json::to_string_pretty( self )?;
        fs::write( path, json )?;
        Ok(())
    }
}


#[cfg( test )]
mod tests {
    use assert_matches::assert_matches;

    use super::*;


    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "nested" ).join( "settings.json" );

        let mut settings = Settings::default();
        settings.default_context = "radio".into();
        settings.engine.extra_args = vec![ "--ao=null".into() ];
        settings.engine.socket_dir = Some( dir.path().to_path_buf() );

        settings.save_to( &path ).unwrap();
        let loaded = Settings::load_from( &path ).unwrap();
        assert_eq!( loaded, settings );
    }


    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, r#"{ "engine": { "mpv_path": "/opt/mpv/bin/mpv" } }"# ).unwrap();

        let loaded = Settings::load_from( &path ).unwrap();
        assert_eq!( loaded.default_context, DEFAULT_CONTEXT );
        assert_eq!( loaded.engine.mpv_path, PathBuf::from( "/opt/mpv/bin/mpv" ) );
        assert_eq!( loaded.engine.connect_timeout(), Duration::from_secs( 5 ) );
    }


    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, "not json" ).unwrap();

        assert_matches!( Settings::load_from( &path ), Err( SettingsError::Parse( _ ) ) );
    }


    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Settings::load_from( &dir.path().join( "absent.json" ) );
        assert_matches!( result, Err( SettingsError::Io( _ ) ) );
    }


    #[test]
    fn test_explicit_socket_dir_wins() {
        let settings = EngineSettings {
            socket_dir: Some( PathBuf::from( "/tmp/sockets" ) ),
            ..EngineSettings::default()
        };
        assert_eq!( settings.resolved_socket_dir(), PathBuf::from( "/tmp/sockets" ) );
    }
}
