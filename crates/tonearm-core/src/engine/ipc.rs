//! mpv JSON IPC backend
//!
//! Each engine is a separate `mpv --idle` process listening on its own unix
//! socket. Requests are single-line JSON objects; replies are matched by
//! `request_id`, and asynchronous event lines are skipped.

use std::fs;
use std::io::{ self, BufRead, BufReader, Write };
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::{ Child, Command, Stdio };
use std::thread;
use std::time::{ Duration, Instant };

use serde::{ Deserialize, Serialize };
use serde_json::Value;

use super::{ Engine, EngineFactory, PropertyValue };
use crate::settings::EngineSettings;
use crate::status::Status;


const POLL_INTERVAL: Duration = Duration::from_millis( 20 );


#[derive( Serialize )]
struct IpcRequest<'a> {
    command: &'a [&'a str],
    request_id: u64,
}


#[derive( Debug, Deserialize )]
struct IpcReply {
    #[serde( default )]
    data: Value,
    error: Option<String>,
    request_id: Option<u64>,
    event: Option<String>,
}


/// Logs an I/O failure and folds it into a generic status.
fn io_failure( what: &str, error: io::Error ) -> Status {
    tracing::error!( "Engine IPC {} failed: {}", what, error );
    Status::GENERIC
}


/// An mpv instance reached over its IPC socket.
pub struct IpcEngine {
    socket_path: PathBuf,
    settings: EngineSettings,
    child: Option<Child>,
    stream: Option<BufReader<UnixStream>>,
    next_request_id: u64,
}


impl IpcEngine {
    /// Wraps an engine process spawned by the factory.
    fn spawned( child: Child, socket_path: PathBuf, settings: EngineSettings ) -> Self {
        Self {
            socket_path,
            settings,
            child: Some( child ),
            stream: None,
            next_request_id: 1,
        }
    }


    /// Attaches to an engine that is already listening on `socket_path`.
    ///
    /// No connection is made until `initialize`. The engine is asked to quit
    /// on `terminate`, but the socket file is left alone.
    pub fn attach( socket_path: impl Into<PathBuf>, settings: EngineSettings ) -> Self {
        Self {
            socket_path: socket_path.into(),
            settings,
            child: None,
            stream: None,
            next_request_id: 1,
        }
    }


    /// Returns true if a spawned engine process has already exited.
    fn child_exited( &mut self ) -> bool {
        match self.child.as_mut().map( |c| c.try_wait() ) {
            Some( Ok( Some( status ) ) ) => {
                tracing::error!( "Engine process exited early: {}", status );
                true
            }
            _ => false,
        }
    }


    /// Sends one request and waits for its reply.
    fn request( &mut self, args: &[&str] ) -> Result<Value, Status> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let stream = self.stream.as_mut().ok_or( Status::UNINITIALIZED )?;

        let mut line = serde_json::to_string( &IpcRequest { command: args, request_id } )
            .map_err( |e| {
                tracing::error!( "Failed to encode engine request: {}", e );
                Status::INVALID_PARAMETER
            })?;
        line.push( '\n' );

        stream.get_mut().write_all( line.as_bytes() )
            .map_err( |e| io_failure( "write", e ) )?;

        // Events and stale replies must not extend the wait indefinitely
        let deadline = Instant::now() + self.settings.request_timeout();

        loop {
            let remaining = deadline.saturating_duration_since( Instant::now() );
            if remaining.is_zero() {
                tracing::error!( "Timed out waiting for reply to {:?}", args );
                return Err( Status::GENERIC );
            }
            stream.get_ref().set_read_timeout( Some( remaining ) )
                .map_err( |e| io_failure( "configure", e ) )?;

            let mut buf = String::new();
            let read = stream.read_line( &mut buf )
                .map_err( |e| io_failure( "read", e ) )?;

            if read == 0 {
                tracing::error!( "Engine closed the IPC connection" );
                return Err( Status::GENERIC );
            }

            let reply: IpcReply = match serde_json::from_str( &buf ) {
                Ok( reply ) => reply,
                Err( e ) => {
                    tracing::warn!( "Skipping malformed engine reply {:?}: {}", buf.trim_end(), e );
                    continue;
                }
            };

            if let Some( event ) = reply.event {
                tracing::trace!( "Engine event: {}", event );
                continue;
            }

            if reply.request_id != Some( request_id ) {
                continue;
            }

            let status = reply.error
                .as_deref()
                .map( Status::from_error_str )
                .unwrap_or( Status::SUCCESS );

            return if status.is_success() {
                Ok( reply.data )
            } else {
                Err( status )
            };
        }
    }
}


impl Engine for IpcEngine {
    fn initialize( &mut self ) -> Status {
        if self.stream.is_some() {
            return Status::SUCCESS;
        }

        let deadline = Instant::now() + self.settings.connect_timeout();

        loop {
            match UnixStream::connect( &self.socket_path ) {
                Ok( stream ) => {
                    if let Err( e ) = stream.set_read_timeout( Some( self.settings.request_timeout() ) ) {
                        return io_failure( "configure", e );
                    }
                    tracing::debug!( "Connected to engine at {:?}", self.socket_path );
                    self.stream = Some( BufReader::new( stream ) );
                    return Status::SUCCESS;
                }
                Err( e ) => {
                    if self.child_exited() {
                        return Status::GENERIC;
                    }
                    if Instant::now() >= deadline {
                        tracing::error!(
                            "Timed out connecting to engine at {:?}: {}",
                            self.socket_path,
                            e
                        );
                        return Status::UNINITIALIZED;
                    }
                    thread::sleep( POLL_INTERVAL );
                }
            }
        }
    }


    fn command( &mut self, args: &[&str] ) -> Status {
        match self.request( args ) {
            Ok( _ ) => Status::SUCCESS,
            Err( status ) => status,
        }
    }


    fn get_property( &mut self, name: &str ) -> Result<PropertyValue, Status> {
        self.request( &[ "get_property", name ] ).map( PropertyValue::from )
    }


    fn terminate( &mut self ) {
        if let Some( reader ) = self.stream.take() {
            let mut stream = reader.into_inner();
            // Engine may already be gone; nothing to do about a failed quit.
            let _ = stream.write_all( b"{\"command\":[\"quit\"]}\n" );
        }

        if let Some( mut child ) = self.child.take() {
            let deadline = Instant::now() + self.settings.quit_grace();
            loop {
                match child.try_wait() {
                    Ok( Some( _ ) ) => break,
                    Ok( None ) if Instant::now() < deadline => thread::sleep( POLL_INTERVAL ),
                    _ => {
                        tracing::warn!( "Engine did not quit in time, killing pid {}", child.id() );
                        let _ = child.kill();
                        let _ = child.wait();
                        break;
                    }
                }
            }

            if let Err( e ) = fs::remove_file( &self.socket_path ) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!( "Failed to remove socket {:?}: {}", self.socket_path, e );
                }
            }
        }
    }
}


impl Drop for IpcEngine {
    fn drop( &mut self ) {
        // No-op if already terminated
        self.terminate();
    }
}


/// Spawns one `mpv --idle` process per context.
pub struct IpcEngineFactory {
    settings: EngineSettings,
    next_id: u64,
}


impl IpcEngineFactory {
    pub fn new( settings: EngineSettings ) -> Self {
        Self { settings, next_id: 0 }
    }


    fn next_socket_path( &mut self ) -> PathBuf {
        self.next_id += 1;
        self.settings
            .resolved_socket_dir()
            .join( format!( "tonearm-{}-{}.sock", std::process::id(), self.next_id ) )
    }
}


impl EngineFactory for IpcEngineFactory {
    type Engine = IpcEngine;


    fn create( &mut self, name: &str ) -> Result<IpcEngine, Status> {
        let socket_path = self.next_socket_path();

        if socket_path.exists() {
            fs::remove_file( &socket_path ).map_err( |e| io_failure( "socket cleanup", e ) )?;
        }

        let child = Command::new( &self.settings.mpv_path )
            .arg( "--idle=yes" )
            .arg( "--no-terminal" )
            .arg( format!( "--input-ipc-server={}", socket_path.display() ) )
            .args( &self.settings.extra_args )
            .stdin( Stdio::null() )
            .stdout( Stdio::null() )
            .stderr( Stdio::null() )
            .spawn()
            .map_err( |e| {
                tracing::error!( "Failed to spawn {:?}: {}", self.settings.mpv_path, e );
                Status::GENERIC
            })?;

        tracing::info!( "Spawned engine pid {} for context '{}' at {:?}", child.id(), name, socket_path );
        Ok( IpcEngine::spawned( child, socket_path, self.settings.clone() ) )
    }
}


#[cfg( test )]
mod tests {
    use std::os::unix::net::UnixListener;
    use std::sync::mpsc;

    use serde_json::json;

    use super::*;
    use crate::facade::{ FacadeError, PlaybackFacade };
    use crate::settings::Settings;


    /// Serves canned replies on a unix socket until `quit` arrives.
    /// Returns every command array received.
    fn fake_engine( listener: UnixListener ) -> thread::JoinHandle<Vec<Vec<String>>> {
        thread::spawn( move || {
            let ( stream, _ ) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let reader = BufReader::new( stream );
            let mut seen = Vec::new();

            for line in reader.lines().map_while( Result::ok ) {
                let request: Value = serde_json::from_str( &line ).unwrap();
                let command: Vec<String> = serde_json::from_value( request[ "command" ].clone() ).unwrap();
                let request_id = request[ "request_id" ].clone();
                seen.push( command.clone() );

                let reply = match command.iter().map( String::as_str ).collect::<Vec<_>>().as_slice() {
                    [ "quit" ] => break,
                    [ "get_property", "time-pos" ] => json!({ "data": 12.5, "error": "success", "request_id": request_id }),
                    [ "get_property", _ ] => json!({ "error": "property unavailable", "request_id": request_id }),
                    [ "loadfile", "missing.mp3", .. ] => json!({ "error": "loading failed", "request_id": request_id }),
                    _ => json!({ "data": null, "error": "success", "request_id": request_id }),
                };

                // Interleave an event and a stale reply to exercise matching
                writeln!( writer, "{}", json!({ "event": "playback-restart" }) ).unwrap();
                writeln!( writer, "{}", json!({ "error": "success", "request_id": 9999 }) ).unwrap();
                writeln!( writer, "{}", reply ).unwrap();
            }

            seen
        })
    }


    fn test_settings() -> EngineSettings {
        EngineSettings {
            connect_timeout_ms: 200,
            request_timeout_ms: 2_000,
            quit_grace_ms: 100,
            ..EngineSettings::default()
        }
    }


    #[test]
    fn test_commands_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "engine.sock" );
        let server = fake_engine( UnixListener::bind( &path ).unwrap() );

        let mut engine = IpcEngine::attach( &path, test_settings() );
        assert_eq!( engine.initialize(), Status::SUCCESS );
        assert_eq!( engine.command( &[ "cycle", "pause" ] ), Status::SUCCESS );
        assert_eq!( engine.command( &[ "loadfile", "missing.mp3", "append" ] ), Status::LOADING_FAILED );
        assert_eq!( engine.get_property( "time-pos" ), Ok( PropertyValue::Double( 12.5 ) ) );
        assert_eq!( engine.get_property( "playlist/count" ), Err( Status::PROPERTY_UNAVAILABLE ) );
        engine.terminate();

        let seen = server.join().unwrap();
        assert_eq!( seen.len(), 5 );
        assert_eq!( seen[ 0 ], vec![ "cycle", "pause" ] );
        assert_eq!( seen[ 4 ], vec![ "quit" ] );

        // Attached engines do not own the socket file
        assert!( path.exists() );
    }


    #[test]
    fn test_request_times_out_under_event_flood() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "engine.sock" );
        let listener = UnixListener::bind( &path ).unwrap();

        // Never answers, only streams events until the client hangs up
        let server = thread::spawn( move || {
            let ( stream, _ ) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new( stream );
            let mut request = String::new();
            reader.read_line( &mut request ).unwrap();

            while writeln!( writer, "{}", json!({ "event": "audio-reconfig" }) ).is_ok() {
                thread::sleep( Duration::from_millis( 5 ) );
            }
        });

        let settings = EngineSettings {
            request_timeout_ms: 300,
            ..test_settings()
        };
        let mut engine = IpcEngine::attach( &path, settings );
        assert_eq!( engine.initialize(), Status::SUCCESS );

        let started = Instant::now();
        assert_eq!( engine.command( &[ "playlist-next" ] ), Status::GENERIC );
        let elapsed = started.elapsed();
        assert!( elapsed >= Duration::from_millis( 300 ) );
        assert!( elapsed < Duration::from_secs( 5 ) );

        engine.terminate();
        server.join().unwrap();
    }


    #[test]
    fn test_command_before_initialize() {
        let mut engine = IpcEngine::attach( "/nonexistent/engine.sock", test_settings() );
        assert_eq!( engine.command( &[ "playlist-next" ] ), Status::UNINITIALIZED );
    }


    #[test]
    fn test_initialize_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = IpcEngine::attach( dir.path().join( "nobody.sock" ), test_settings() );

        let started = Instant::now();
        assert_eq!( engine.initialize(), Status::UNINITIALIZED );
        assert!( started.elapsed() >= Duration::from_millis( 200 ) );
    }


    #[test]
    fn test_closed_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "engine.sock" );
        let listener = UnixListener::bind( &path ).unwrap();
        let ( tx, rx ) = mpsc::channel();
        let server = thread::spawn( move || {
            let ( stream, _ ) = listener.accept().unwrap();
            rx.recv().unwrap();
            drop( stream );
        });

        let mut engine = IpcEngine::attach( &path, test_settings() );
        assert_eq!( engine.initialize(), Status::SUCCESS );
        tx.send( () ).unwrap();
        server.join().unwrap();

        assert!( !engine.command( &[ "playlist-next" ] ).is_success() );
    }


    #[test]
    fn test_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut factory = IpcEngineFactory::new( EngineSettings {
            mpv_path: dir.path().join( "no-such-mpv" ),
            socket_dir: Some( dir.path().to_path_buf() ),
            ..test_settings()
        });

        assert_eq!( factory.create( "default" ).err(), Some( Status::GENERIC ) );
    }


    #[test]
    fn test_socket_paths_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let mut factory = IpcEngineFactory::new( EngineSettings {
            socket_dir: Some( dir.path().to_path_buf() ),
            ..test_settings()
        });

        let first = factory.next_socket_path();
        let second = factory.next_socket_path();
        assert_ne!( first, second );
        assert!( first.starts_with( dir.path() ) );
    }


    /// Hands out engines attached to one pre-bound socket.
    struct AttachFactory {
        socket_path: PathBuf,
    }


    impl EngineFactory for AttachFactory {
        type Engine = IpcEngine;


        fn create( &mut self, _name: &str ) -> Result<IpcEngine, Status> {
            Ok( IpcEngine::attach( &self.socket_path, test_settings() ) )
        }
    }


    #[test]
    fn test_facade_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "engine.sock" );
        let server = fake_engine( UnixListener::bind( &path ).unwrap() );

        let mut facade = PlaybackFacade::with_default_context( AttachFactory { socket_path: path.clone() } ).unwrap();
        facade.add_file( "track01.opus" ).unwrap();
        facade.set_volume( 80 ).unwrap();
        assert_eq!( facade.current_time_seconds().unwrap(), 12.5 );
        assert!( matches!(
            facade.add_file( "missing.mp3" ),
            Err( FacadeError::EngineCommand { status: Status::LOADING_FAILED, .. } )
        ));
        drop( facade );

        let seen = server.join().unwrap();
        let lines: Vec<String> = seen.iter().map( |c| c.join( " " ) ).collect();
        assert_eq!( lines, vec![
            "cycle pause",
            "set video no",
            "loadfile track01.opus append",
            "set volume 80",
            "get_property time-pos",
            "loadfile missing.mp3 append",
            "quit",
        ]);
    }


    #[test]
    fn test_facade_from_settings_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            engine: EngineSettings {
                mpv_path: dir.path().join( "no-such-mpv" ),
                socket_dir: Some( dir.path().to_path_buf() ),
                ..test_settings()
            },
            ..Settings::default()
        };

        let err = PlaybackFacade::from_settings( &settings ).err().unwrap();
        assert!( matches!(
            err,
            FacadeError::EngineInit { ref name, status: Status::GENERIC } if name == "default"
        ));
    }
}
