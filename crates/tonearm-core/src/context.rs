//! Named playback contexts
//!
//! A context exclusively owns one engine instance and tears it down when
//! dropped, so every engine is terminated exactly once.

use crate::engine::{ Engine, PropertyValue };
use crate::facade::{ FacadeError, Result };


/// One independent playback session.
pub struct Context<E: Engine> {
    name: String,
    engine: E,
}


impl<E: Engine> Context<E> {
    /// Takes ownership of a freshly created engine.
    pub fn new( name: impl Into<String>, engine: E ) -> Self {
        Self { name: name.into(), engine }
    }


    pub fn name( &self ) -> &str {
        &self.name
    }


    /// Initializes the engine, reporting failure as an init error.
    pub fn initialize( &mut self ) -> Result<()> {
        self.engine.initialize().ok().map_err( |status| FacadeError::EngineInit {
            name: self.name.clone(),
            status,
        })
    }


    /// Issues a command against this context's engine.
    pub fn command( &mut self, args: &[&str] ) -> Result<()> {
        tracing::debug!( "[{}] {}", self.name, args.join( " " ) );

        self.engine.command( args ).ok().map_err( |status| {
            let command = args.join( " " );
            tracing::debug!( "[{}] `{}` failed: {}", self.name, command, status );
            FacadeError::EngineCommand { command, status }
        })
    }


    /// Reads a property from this context's engine.
    pub fn get_property( &mut self, name: &str ) -> Result<PropertyValue> {
        self.engine.get_property( name ).map_err( |status| FacadeError::EngineCommand {
            command: format!( "get_property {}", name ),
            status,
        })
    }
}


impl<E: Engine> Drop for Context<E> {
    fn drop( &mut self ) {
        tracing::info!( "Terminating context '{}'", self.name );
        self.engine.terminate();
    }
}


#[cfg( test )]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::engine::mock::MockFactory;
    use crate::engine::EngineFactory;
    use crate::status::Status;


    #[test]
    fn test_drop_terminates_once() {
        let mut factory = MockFactory::new();
        let log = factory.log.clone();

        let context = Context::new( "a", factory.create( "a" ).unwrap() );
        assert!( log.borrow().terminated.is_empty() );

        drop( context );
        assert_eq!( log.borrow().terminated, vec![ "a".to_string() ] );
    }


    #[test]
    fn test_failed_command_carries_status() {
        let mut factory = MockFactory::new().failing( "playlist-next", Status::COMMAND );
        let mut context = Context::new( "a", factory.create( "a" ).unwrap() );

        let err = context.command( &[ "playlist-next" ] ).unwrap_err();
        assert_matches!(
            err,
            FacadeError::EngineCommand { ref command, status: Status::COMMAND } if command == "playlist-next"
        );
    }


    #[test]
    fn test_initialize_failure_is_init_error() {
        let mut factory = MockFactory::new();
        factory.initialize_status = Some( Status::NOMEM );
        let mut context = Context::new( "a", factory.create( "a" ).unwrap() );

        assert_matches!(
            context.initialize(),
            Err( FacadeError::EngineInit { status: Status::NOMEM, .. } )
        );
    }
}
