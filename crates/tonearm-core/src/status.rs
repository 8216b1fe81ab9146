//! Engine status codes
//!
//! Every engine call reports an integer status. Zero and positive values
//! mean success; negative values are the engine's error codes.

use std::fmt;


/// Status code returned by an engine call.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub struct Status( pub i32 );


/// Code and description for each known engine error.
const ERROR_TABLE: &[( i32, &str )] = &[
    ( 0, "success" ),
    ( -1, "event queue full" ),
    ( -2, "memory allocation failed" ),
    ( -3, "core not initialized" ),
    ( -4, "invalid parameter" ),
    ( -5, "option not found" ),
    ( -6, "unsupported format for accessing option" ),
    ( -7, "error setting option" ),
    ( -8, "property not found" ),
    ( -9, "unsupported format for accessing property" ),
    ( -10, "property unavailable" ),
    ( -11, "error accessing property" ),
    ( -12, "error running command" ),
    ( -13, "loading failed" ),
    ( -14, "audio output initialization failed" ),
    ( -15, "video output initialization failed" ),
    ( -16, "no audio or video data played" ),
    ( -17, "unrecognized file format" ),
    ( -18, "not supported" ),
    ( -19, "operation not implemented" ),
    ( -20, "something happened" ),
];


impl Status {
    pub const SUCCESS: Status = Status( 0 );
    pub const EVENT_QUEUE_FULL: Status = Status( -1 );
    pub const NOMEM: Status = Status( -2 );
    pub const UNINITIALIZED: Status = Status( -3 );
    pub const INVALID_PARAMETER: Status = Status( -4 );
    pub const OPTION_NOT_FOUND: Status = Status( -5 );
    pub const OPTION_FORMAT: Status = Status( -6 );
    pub const OPTION_ERROR: Status = Status( -7 );
    pub const PROPERTY_NOT_FOUND: Status = Status( -8 );
    pub const PROPERTY_FORMAT: Status = Status( -9 );
    pub const PROPERTY_UNAVAILABLE: Status = Status( -10 );
    pub const PROPERTY_ERROR: Status = Status( -11 );
    pub const COMMAND: Status = Status( -12 );
    pub const LOADING_FAILED: Status = Status( -13 );
    pub const AO_INIT_FAILED: Status = Status( -14 );
    pub const VO_INIT_FAILED: Status = Status( -15 );
    pub const NOTHING_TO_PLAY: Status = Status( -16 );
    pub const UNKNOWN_FORMAT: Status = Status( -17 );
    pub const UNSUPPORTED: Status = Status( -18 );
    pub const NOT_IMPLEMENTED: Status = Status( -19 );
    pub const GENERIC: Status = Status( -20 );


    /// Returns true if the status reports success.
    pub fn is_success( self ) -> bool {
        self.0 >= 0
    }


    /// Converts the status into a `Result`, keeping the status as the error.
    pub fn ok( self ) -> Result<(), Status> {
        if self.is_success() {
            Ok(())
        } else {
            Err( self )
        }
    }


    /// Human readable description, matching the engine's own wording.
    pub fn description( self ) -> &'static str {
        if self.0 > 0 {
            return "success";
        }

        ERROR_TABLE.iter()
            .find( |( code, _ )| *code == self.0 )
            .map( |( _, text )| *text )
            .unwrap_or( "unknown error" )
    }


    /// Maps an engine error string (as sent over IPC) back to its code.
    ///
    /// @param text - Error string from the engine, e.g. "property unavailable"
    ///
    /// @returns The matching status, or `Status::GENERIC` if unrecognized
    pub fn from_error_str( text: &str ) -> Status {
        let text = text.trim();
        ERROR_TABLE.iter()
            .find( |( _, description )| description.eq_ignore_ascii_case( text ) )
            .map( |( code, _ )| Status( *code ) )
            .unwrap_or( Status::GENERIC )
    }
}


impl fmt::Display for Status {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        write!( f, "{} ({})", self.description(), self.0 )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_success_codes() {
        assert!( Status::SUCCESS.is_success() );
        assert!( Status( 3 ).is_success() );
        assert!( !Status::GENERIC.is_success() );
        assert_eq!( Status( 3 ).description(), "success" );
    }


    #[test]
    fn test_ok_conversion() {
        assert_eq!( Status::SUCCESS.ok(), Ok(()) );
        assert_eq!( Status::COMMAND.ok(), Err( Status::COMMAND ) );
    }


    #[test]
    fn test_description_lookup() {
        assert_eq!( Status::PROPERTY_UNAVAILABLE.description(), "property unavailable" );
        assert_eq!( Status( -99 ).description(), "unknown error" );
    }


    #[test]
    fn test_from_error_str() {
        assert_eq!( Status::from_error_str( "success" ), Status::SUCCESS );
        assert_eq!( Status::from_error_str( "error running command" ), Status::COMMAND );
        assert_eq!( Status::from_error_str( " Loading Failed " ), Status::LOADING_FAILED );
        assert_eq!( Status::from_error_str( "gremlins" ), Status::GENERIC );
    }


    #[test]
    fn test_display_includes_code() {
        assert_eq!( Status::INVALID_PARAMETER.to_string(), "invalid parameter (-4)" );
    }
}
