//! Playback control facade
//!
//! Keeps a registry of named playback contexts, tracks which one is current,
//! and turns high-level playback calls into engine commands against it.

use std::collections::HashMap;

use thiserror::Error;

use crate::context::Context;
#[cfg( unix )]
use crate::engine::ipc::IpcEngineFactory;
use crate::engine::{ EngineFactory, PropertyValue };
use crate::seek::SeekMode;
#[cfg( unix )]
use crate::settings::Settings;
use crate::settings::DEFAULT_CONTEXT;
use crate::status::Status;


/// Highest accepted volume level.
pub const MAX_VOLUME: i32 = 999;


/// Errors reported by the facade.
#[derive( Debug, Error )]
pub enum FacadeError {
    #[error( "Failed to initialize engine for context '{name}': {status}" )]
    EngineInit { name: String, status: Status },

    #[error( "Engine command `{command}` failed: {status}" )]
    EngineCommand { command: String, status: Status },

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "No context named '{0}'" )]
    ContextNotFound( String ),

    #[error( "No current context selected" )]
    NoCurrentContext,
}


pub type Result<T> = std::result::Result<T, FacadeError>;


/// Playback control over a set of named engine instances.
pub struct PlaybackFacade<F: EngineFactory> {
    factory: F,
    contexts: HashMap<String, Context<F::Engine>>,
    current: Option<String>,
    /// Locally tracked play state. Never read back from the engine.
    playing: bool,
}


impl<F: EngineFactory> PlaybackFacade<F> {
    /// Creates a facade with no contexts.
    pub fn new( factory: F ) -> Self {
        Self {
            factory,
            contexts: HashMap::new(),
            current: None,
            // New contexts are toggled out of their initial pause
            playing: true,
        }
    }


    /// Creates a facade with a context named "default", already selected.
    pub fn with_default_context( factory: F ) -> Result<Self> {
        Self::with_initial_context( factory, DEFAULT_CONTEXT )
    }


    /// Creates a facade with one named context, already selected.
    pub fn with_initial_context( factory: F, name: &str ) -> Result<Self> {
        let mut facade = Self::new( factory );
        facade.create_context( name )?;
        facade.select_context( name )?;
        Ok( facade )
    }


    /// Creates and initializes a new engine instance under `name`.
    ///
    /// The instance is unpaused and video output is disabled. An existing
    /// context with the same name is torn down and replaced.
    pub fn create_context( &mut self, name: &str ) -> Result<()> {
        let engine = self.factory.create( name ).map_err( |status| {
            tracing::error!( "Failed to create engine for context '{}': {}", name, status );
            FacadeError::EngineInit { name: name.to_string(), status }
        })?;

        // Dropping the context on any failure below terminates the engine
        let mut context = Context::new( name, engine );
        context.initialize()?;
        context.command( &[ "cycle", "pause" ] )?;
        context.command( &[ "set", "video", "no" ] )?;

        if let Some( old ) = self.contexts.insert( name.to_string(), context ) {
            tracing::warn!( "Replacing existing context '{}'", old.name() );
        }

        tracing::info!( "Created context '{}'", name );
        Ok(())
    }


    /// Makes the named context the target of all playback calls.
    pub fn select_context( &mut self, name: &str ) -> Result<()> {
        if !self.contexts.contains_key( name ) {
            tracing::warn!( "Couldn't select context '{}': not found", name );
            return Err( FacadeError::ContextNotFound( name.to_string() ) );
        }

        self.current = Some( name.to_string() );
        tracing::info!( "Selected context '{}'", name );
        Ok(())
    }


    /// Name of the current context, if one is selected.
    pub fn current_context_name( &self ) -> Option<&str> {
        self.current.as_deref()
    }


    /// Names of all registered contexts, in no particular order.
    pub fn context_names( &self ) -> Vec<&str> {
        self.contexts.keys().map( String::as_str ).collect()
    }


    pub fn has_context( &self, name: &str ) -> bool {
        self.contexts.contains_key( name )
    }


    pub fn context_count( &self ) -> usize {
        self.contexts.len()
    }


    /// Locally tracked play state. May drift from the engine's own state.
    pub fn is_playing( &self ) -> bool {
        self.playing
    }


    fn current_mut( &mut self ) -> Result<&mut Context<F::Engine>> {
        let name = self.current.as_deref().ok_or( FacadeError::NoCurrentContext )?;
        self.contexts
            .get_mut( name )
            .ok_or_else( || FacadeError::ContextNotFound( name.to_string() ) )
    }


    fn run( &mut self, args: &[&str] ) -> Result<()> {
        self.current_mut()?.command( args )
    }


    fn property( &mut self, name: &str ) -> Result<PropertyValue> {
        self.current_mut()?.get_property( name )
    }


    /// Appends a media file to the current queue.
    pub fn add_file( &mut self, path: &str ) -> Result<()> {
        self.run( &[ "loadfile", path, "append" ] )
    }


    /// Loads a playlist file, appending to or replacing the current queue.
    pub fn add_playlist( &mut self, path: &str, append: bool ) -> Result<()> {
        let mode = if append { "append" } else { "replace" };
        self.run( &[ "loadlist", path, mode ] )
    }


    /// Sets the volume.
    ///
    /// @param level - Volume between 0 and `MAX_VOLUME`, inclusive
    ///
    /// @returns `InvalidArgument` without contacting the engine if out of range
    pub fn set_volume( &mut self, level: i32 ) -> Result<()> {
        if !( 0..=MAX_VOLUME ).contains( &level ) {
            tracing::warn!( "Rejected volume {}", level );
            return Err( FacadeError::InvalidArgument( format!(
                "Volume must be between 0 and {}, got {}",
                MAX_VOLUME,
                level
            )));
        }

        self.run( &[ "set", "volume", &level.to_string() ] )
    }


    /// Seeks using a textual mode.
    ///
    /// @param time - Seconds, or percent for the percent modes
    /// @param mode - One of relative, absolute, relative-percent, absolute-percent
    pub fn seek( &mut self, time: f64, mode: &str ) -> Result<()> {
        let seek_mode = mode.parse::<SeekMode>().inspect_err( |_| {
            tracing::warn!( "Rejected seek mode '{}'", mode );
        })?;
        self.seek_with( time, seek_mode )
    }


    /// Seeks using an already validated mode.
    pub fn seek_with( &mut self, time: f64, mode: SeekMode ) -> Result<()> {
        self.run( &[ "seek", &time.to_string(), mode.as_str() ] )
    }


    /// Undoes the last seek.
    pub fn revert_seek( &mut self ) -> Result<()> {
        self.run( &[ "revert-seek" ] )
    }


    pub fn playlist_next( &mut self ) -> Result<()> {
        self.run( &[ "playlist-next" ] )
    }


    pub fn playlist_prev( &mut self ) -> Result<()> {
        self.run( &[ "playlist-prev" ] )
    }


    /// Jumps to a queue position. Bounds are checked by the engine.
    pub fn playlist_play_index( &mut self, index: i64 ) -> Result<()> {
        self.run( &[ "set", "playlist-pos", &index.to_string() ] )
    }


    pub fn playlist_clear( &mut self ) -> Result<()> {
        self.run( &[ "playlist-clear" ] )
    }


    /// Removes the entry at a queue position. Bounds are checked by the engine.
    pub fn playlist_remove_index( &mut self, index: i64 ) -> Result<()> {
        self.run( &[ "playlist-remove", &index.to_string() ] )
    }


    /// Moves the entry at `from` so it sits at `to`.
    pub fn playlist_move( &mut self, from: i64, to: i64 ) -> Result<()> {
        self.run( &[ "playlist-move", &from.to_string(), &to.to_string() ] )
    }


    pub fn playlist_shuffle( &mut self ) -> Result<()> {
        self.run( &[ "playlist-shuffle" ] )
    }


    /// Flips pause. The tracked state only changes if the engine accepted it.
    pub fn toggle_pause( &mut self ) -> Result<()> {
        self.run( &[ "cycle", "pause" ] )?;
        self.playing = !self.playing;
        Ok(())
    }


    /// Resumes playback unless it is already tracked as playing.
    pub fn set_playing( &mut self ) -> Result<()> {
        if !self.playing {
            self.toggle_pause()?;
        }
        Ok(())
    }


    /// Pauses playback unless it is already tracked as paused.
    pub fn set_paused( &mut self ) -> Result<()> {
        if self.playing {
            self.toggle_pause()?;
        }
        Ok(())
    }


    /// Current playback position in seconds.
    pub fn current_time_seconds( &mut self ) -> Result<f64> {
        match self.property( "time-pos" )? {
            PropertyValue::None => Err( FacadeError::EngineCommand {
                command: "get_property time-pos".into(),
                status: Status::PROPERTY_UNAVAILABLE,
            }),
            value => value.as_f64().ok_or_else( || FacadeError::EngineCommand {
                command: "get_property time-pos".into(),
                status: Status::PROPERTY_FORMAT,
            }),
        }
    }


    /// Number of entries in the current queue.
    ///
    /// A playlist file loaded with `add_playlist` may be reported as a single
    /// entry until the engine starts playing and expands it.
    pub fn playlist_count( &mut self ) -> Result<usize> {
        let value = self.property( "playlist/count" )?;
        value.as_i64()
            .and_then( |n| usize::try_from( n ).ok() )
            .ok_or_else( || FacadeError::EngineCommand {
                command: "get_property playlist/count".into(),
                status: Status::PROPERTY_FORMAT,
            })
    }


    /// Filenames of every entry in the current queue, in order.
    ///
    /// Subject to the same expansion caveat as `playlist_count`.
    pub fn playlist_entries( &mut self ) -> Result<Vec<String>> {
        let count = self.playlist_count()?;
        // The count is engine-reported; grow as entries actually arrive
        let mut entries = Vec::new();

        for i in 0..count {
            let property = format!( "playlist/{}/filename", i );
            let value = self.property( &property )?;
            let filename = value.as_str().ok_or_else( || FacadeError::EngineCommand {
                command: format!( "get_property {}", property ),
                status: Status::PROPERTY_FORMAT,
            })?;
            entries.push( filename.to_string() );
        }

        Ok( entries )
    }
}


#[cfg( unix )]
impl PlaybackFacade<IpcEngineFactory> {
    /// Spawns engines as configured and starts with the configured default
    /// context selected.
    pub fn from_settings( settings: &Settings ) -> Result<Self> {
        let factory = IpcEngineFactory::new( settings.engine.clone() );
        Self::with_initial_context( factory, &settings.default_context )
    }
}


impl<F: EngineFactory> Drop for PlaybackFacade<F> {
    fn drop( &mut self ) {
        self.current = None;
        // Each context terminates its engine as it is dropped
        for ( _, context ) in self.contexts.drain() {
            drop( context );
        }
        tracing::debug!( "Playback facade torn down" );
    }
}


#[cfg( test )]
mod tests {
    use assert_matches::assert_matches;
    use rstest::rstest;

    use super::*;
    use crate::engine::mock::{ MockFactory, SharedLog };


    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }


    /// Facade with one selected context "a", plus the shared engine log.
    fn facade_with( factory: MockFactory ) -> ( PlaybackFacade<MockFactory>, SharedLog ) {
        init_tracing();
        let log = factory.log.clone();
        let facade = PlaybackFacade::with_initial_context( factory, "a" ).unwrap();
        ( facade, log )
    }


    fn facade() -> ( PlaybackFacade<MockFactory>, SharedLog ) {
        facade_with( MockFactory::new() )
    }


    fn last_command( log: &SharedLog ) -> Option<String> {
        log.borrow().commands.last().map( |( _, cmd )| cmd.clone() )
    }


    #[test]
    fn test_create_context_setup_commands() {
        let ( _facade, log ) = facade();
        assert_eq!( log.borrow().commands_for( "a" ), vec![ "cycle pause", "set video no" ] );
    }


    #[test]
    fn test_default_context() {
        let factory = MockFactory::new();
        let log = factory.log.clone();
        let facade = PlaybackFacade::with_default_context( factory ).unwrap();

        assert_eq!( facade.current_context_name(), Some( "default" ) );
        assert_eq!( log.borrow().created, vec![ "default".to_string() ] );
    }


    #[test]
    fn test_create_failure_is_init_error() {
        let mut factory = MockFactory::new();
        factory.create_status = Some( Status::NOMEM );
        let mut facade = PlaybackFacade::new( factory );

        assert_matches!(
            facade.create_context( "a" ),
            Err( FacadeError::EngineInit { ref name, status: Status::NOMEM } ) if name == "a"
        );
        assert!( !facade.has_context( "a" ) );
    }


    #[test]
    fn test_initialize_failure_terminates_engine() {
        let mut factory = MockFactory::new();
        factory.initialize_status = Some( Status::UNINITIALIZED );
        let log = factory.log.clone();
        let mut facade = PlaybackFacade::new( factory );

        assert_matches!( facade.create_context( "a" ), Err( FacadeError::EngineInit { .. } ) );
        assert_eq!( facade.context_count(), 0 );
        assert_eq!( log.borrow().terminated, vec![ "a".to_string() ] );
    }


    #[test]
    fn test_setup_command_failure_terminates_engine() {
        let factory = MockFactory::new().failing( "set video no", Status::PROPERTY_ERROR );
        let log = factory.log.clone();
        let mut facade = PlaybackFacade::new( factory );

        assert_matches!(
            facade.create_context( "a" ),
            Err( FacadeError::EngineCommand { status: Status::PROPERTY_ERROR, .. } )
        );
        assert!( !facade.has_context( "a" ) );
        assert_eq!( log.borrow().terminated.len(), 1 );
    }


    #[test]
    fn test_no_current_context() {
        let mut facade = PlaybackFacade::new( MockFactory::new() );
        facade.create_context( "a" ).unwrap();

        assert_matches!( facade.playlist_next(), Err( FacadeError::NoCurrentContext ) );
        assert_matches!( facade.current_time_seconds(), Err( FacadeError::NoCurrentContext ) );
    }


    #[test]
    fn test_select_targets_context() {
        let ( mut facade, log ) = facade();
        facade.create_context( "b" ).unwrap();

        facade.select_context( "b" ).unwrap();
        facade.add_file( "song.flac" ).unwrap();
        assert_eq!( log.borrow().commands_for( "b" ).last().unwrap(), "loadfile song.flac append" );

        facade.select_context( "a" ).unwrap();
        facade.playlist_next().unwrap();
        assert_eq!( log.borrow().commands_for( "a" ).last().unwrap(), "playlist-next" );
        assert_eq!( log.borrow().commands_for( "b" ).len(), 3 );
    }


    #[test]
    fn test_select_missing_keeps_current() {
        let ( mut facade, _log ) = facade();

        assert_matches!(
            facade.select_context( "missing" ),
            Err( FacadeError::ContextNotFound( ref name ) ) if name == "missing"
        );
        assert_eq!( facade.current_context_name(), Some( "a" ) );
    }


    #[test]
    fn test_recreate_replaces_context() {
        let ( mut facade, log ) = facade();
        facade.create_context( "a" ).unwrap();

        assert_eq!( facade.context_count(), 1 );
        assert_eq!( log.borrow().terminated, vec![ "a".to_string() ] );
        assert_eq!( facade.current_context_name(), Some( "a" ) );
        facade.playlist_clear().unwrap();
    }


    #[test]
    fn test_teardown_terminates_each_context_once() {
        let ( mut facade, log ) = facade();
        facade.create_context( "b" ).unwrap();
        facade.create_context( "c" ).unwrap();

        let mut names = facade.context_names();
        names.sort();
        assert_eq!( names, vec![ "a", "b", "c" ] );

        drop( facade );

        let mut terminated = log.borrow().terminated.clone();
        terminated.sort();
        assert_eq!( terminated, vec![ "a", "b", "c" ] );
    }


    #[rstest]
    #[case( 0, true )]
    #[case( 100, true )]
    #[case( 999, true )]
    #[case( 1000, false )]
    #[case( -1, false )]
    #[case( i32::MIN, false )]
    fn test_volume_range( #[case] level: i32, #[case] applied: bool ) {
        let ( mut facade, log ) = facade();
        let before = log.borrow().commands.len();

        let result = facade.set_volume( level );

        if applied {
            assert!( result.is_ok() );
            assert_eq!( last_command( &log ), Some( format!( "set volume {}", level ) ) );
        } else {
            assert_matches!( result, Err( FacadeError::InvalidArgument( _ ) ) );
            assert_eq!( log.borrow().commands.len(), before );
        }
    }


    #[rstest]
    #[case( "relative", true )]
    #[case( "absolute", true )]
    #[case( "relative-percent", true )]
    #[case( "absolute-percent", true )]
    #[case( "absolute+exact", false )]
    #[case( "forward", false )]
    fn test_seek_modes( #[case] mode: &str, #[case] issued: bool ) {
        let ( mut facade, log ) = facade();
        let before = log.borrow().commands.len();

        let result = facade.seek( 30.0, mode );

        if issued {
            assert!( result.is_ok() );
            assert_eq!( last_command( &log ), Some( format!( "seek 30 {}", mode ) ) );
        } else {
            assert_matches!( result, Err( FacadeError::InvalidArgument( _ ) ) );
            assert_eq!( log.borrow().commands.len(), before );
        }
    }


    #[test]
    fn test_seek_fractional_and_negative() {
        let ( mut facade, log ) = facade();
        facade.seek_with( -2.5, SeekMode::Relative ).unwrap();
        assert_eq!( last_command( &log ).unwrap(), "seek -2.5 relative" );
    }


    #[test]
    fn test_queue_commands() {
        let ( mut facade, log ) = facade();

        facade.add_playlist( "list.m3u", true ).unwrap();
        assert_eq!( last_command( &log ).unwrap(), "loadlist list.m3u append" );
        facade.add_playlist( "list.m3u", false ).unwrap();
        assert_eq!( last_command( &log ).unwrap(), "loadlist list.m3u replace" );

        facade.playlist_play_index( 2 ).unwrap();
        assert_eq!( last_command( &log ).unwrap(), "set playlist-pos 2" );
        facade.playlist_remove_index( 0 ).unwrap();
        assert_eq!( last_command( &log ).unwrap(), "playlist-remove 0" );
        facade.playlist_move( 3, 1 ).unwrap();
        assert_eq!( last_command( &log ).unwrap(), "playlist-move 3 1" );

        facade.revert_seek().unwrap();
        facade.playlist_prev().unwrap();
        facade.playlist_shuffle().unwrap();
        facade.playlist_clear().unwrap();
        assert_eq!(
            log.borrow().commands_for( "a" )[ 7.. ],
            [ "revert-seek", "playlist-prev", "playlist-shuffle", "playlist-clear" ]
        );
    }


    #[test]
    fn test_out_of_range_index_is_engine_error() {
        let factory = MockFactory::new().failing( "playlist-remove 42", Status::COMMAND );
        let ( mut facade, _log ) = facade_with( factory );

        assert_matches!(
            facade.playlist_remove_index( 42 ),
            Err( FacadeError::EngineCommand { ref command, status: Status::COMMAND } ) if command == "playlist-remove 42"
        );
    }


    #[test]
    fn test_toggle_pause_twice_restores_state() {
        let ( mut facade, _log ) = facade();
        let initial = facade.is_playing();

        facade.toggle_pause().unwrap();
        assert_eq!( facade.is_playing(), !initial );
        facade.toggle_pause().unwrap();
        assert_eq!( facade.is_playing(), initial );
    }


    #[test]
    fn test_set_playing_and_paused_are_idempotent() {
        let ( mut facade, log ) = facade();
        let toggles = || log.borrow().count( "cycle pause" );
        let after_setup = toggles();

        facade.set_paused().unwrap();
        facade.set_paused().unwrap();
        assert!( !facade.is_playing() );
        assert_eq!( toggles(), after_setup + 1 );

        facade.set_playing().unwrap();
        facade.set_playing().unwrap();
        assert!( facade.is_playing() );
        assert_eq!( toggles(), after_setup + 2 );
    }


    #[test]
    fn test_failed_toggle_keeps_state() {
        let ( mut facade, _log ) = facade();

        // Swap in an engine for "a" that refuses to toggle
        let mut broken = MockFactory::new().failing( "cycle pause", Status::COMMAND );
        broken.log = facade.factory.log.clone();
        let engine = broken.create( "a" ).unwrap();
        facade.contexts.insert( "a".into(), Context::new( "a", engine ) );

        assert!( facade.toggle_pause().is_err() );
        assert!( facade.is_playing() );
    }


    #[test]
    fn test_current_time() {
        let factory = MockFactory::new().with_property( "time-pos", PropertyValue::Double( 83.25 ) );
        let ( mut facade, _log ) = facade_with( factory );
        assert_eq!( facade.current_time_seconds().unwrap(), 83.25 );
    }


    #[test]
    fn test_current_time_unavailable() {
        let ( mut facade, _log ) = facade();
        assert_matches!(
            facade.current_time_seconds(),
            Err( FacadeError::EngineCommand { status: Status::PROPERTY_UNAVAILABLE, .. } )
        );

        let factory = MockFactory::new().with_property( "time-pos", PropertyValue::String( "soon".into() ) );
        let ( mut facade, _log ) = facade_with( factory );
        assert_matches!(
            facade.current_time_seconds(),
            Err( FacadeError::EngineCommand { status: Status::PROPERTY_FORMAT, .. } )
        );
    }


    #[test]
    fn test_playlist_entries() {
        let factory = MockFactory::new()
            .with_property( "playlist/count", PropertyValue::Int( 2 ) )
            .with_property( "playlist/0/filename", PropertyValue::String( "one.ogg".into() ) )
            .with_property( "playlist/1/filename", PropertyValue::String( "two.ogg".into() ) );
        let ( mut facade, _log ) = facade_with( factory );

        assert_eq!( facade.playlist_count().unwrap(), 2 );
        assert_eq!( facade.playlist_entries().unwrap(), vec![ "one.ogg", "two.ogg" ] );
    }


    #[test]
    fn test_playlist_entries_missing_filename() {
        let factory = MockFactory::new()
            .with_property( "playlist/count", PropertyValue::Int( 1 ) );
        let ( mut facade, _log ) = facade_with( factory );

        assert_matches!(
            facade.playlist_entries(),
            Err( FacadeError::EngineCommand { status: Status::PROPERTY_UNAVAILABLE, .. } )
        );
    }


    #[test]
    fn test_playlist_entries_huge_count() {
        let factory = MockFactory::new()
            .with_property( "playlist/count", PropertyValue::Int( i64::MAX ) )
            .with_property( "playlist/0/filename", PropertyValue::String( "one.ogg".into() ) );
        let ( mut facade, _log ) = facade_with( factory );

        // Stops at the first entry the engine cannot report
        assert_matches!(
            facade.playlist_entries(),
            Err( FacadeError::EngineCommand { ref command, status: Status::PROPERTY_UNAVAILABLE } )
                if command == "get_property playlist/1/filename"
        );
    }


    #[test]
    fn test_playlist_entries_non_string_filename() {
        let factory = MockFactory::new()
            .with_property( "playlist/count", PropertyValue::Int( 1 ) )
            .with_property( "playlist/0/filename", PropertyValue::Int( 7 ) );
        let ( mut facade, _log ) = facade_with( factory );

        assert_matches!(
            facade.playlist_entries(),
            Err( FacadeError::EngineCommand { ref command, status: Status::PROPERTY_FORMAT } )
                if command == "get_property playlist/0/filename"
        );
    }


    #[rstest]
    #[case( PropertyValue::Int( -1 ) )]
    #[case( PropertyValue::Double( 2.5 ) )]
    #[case( PropertyValue::String( "3".into() ) )]
    #[case( PropertyValue::None )]
    fn test_playlist_count_bad_format( #[case] count: PropertyValue ) {
        let factory = MockFactory::new().with_property( "playlist/count", count );
        let ( mut facade, _log ) = facade_with( factory );

        assert_matches!(
            facade.playlist_count(),
            Err( FacadeError::EngineCommand { ref command, status: Status::PROPERTY_FORMAT } )
                if command == "get_property playlist/count"
        );
    }


    #[test]
    fn test_playlist_count_integral_double() {
        let factory = MockFactory::new().with_property( "playlist/count", PropertyValue::Double( 3.0 ) );
        let ( mut facade, _log ) = facade_with( factory );
        assert_eq!( facade.playlist_count().unwrap(), 3 );
    }
}
