//! Playback engine abstraction
//!
//! The facade never decodes or renders anything itself. It drives engine
//! instances through the small command/property protocol defined here.

#[cfg( unix )]
pub mod ipc;

#[cfg( test )]
pub( crate ) mod mock;

use serde_json::Value;

use crate::status::Status;


/// Typed value returned by a property get.
#[derive( Debug, Clone, PartialEq )]
pub enum PropertyValue {
    None,
    Flag( bool ),
    Int( i64 ),
    Double( f64 ),
    String( String ),
    /// Structured values (lists, maps) are kept as raw JSON.
    Node( Value ),
}


impl PropertyValue {
    /// Returns the value as floating point, accepting integers too.
    pub fn as_f64( &self ) -> Option<f64> {
        match self {
            PropertyValue::Double( v ) => Some( *v ),
            PropertyValue::Int( v ) => Some( *v as f64 ),
            _ => None,
        }
    }


    /// Returns the value as an integer. Doubles are only accepted when integral.
    pub fn as_i64( &self ) -> Option<i64> {
        match self {
            PropertyValue::Int( v ) => Some( *v ),
            PropertyValue::Double( v ) if v.fract() == 0.0 => Some( *v as i64 ),
            _ => None,
        }
    }


    pub fn as_str( &self ) -> Option<&str> {
        match self {
            PropertyValue::String( s ) => Some( s ),
            _ => None,
        }
    }
}


impl From<Value> for PropertyValue {
    fn from( value: Value ) -> Self {
        match value {
            Value::Null => PropertyValue::None,
            Value::Bool( b ) => PropertyValue::Flag( b ),
            Value::Number( n ) => match n.as_i64() {
                Some( i ) => PropertyValue::Int( i ),
                None => PropertyValue::Double( n.as_f64().unwrap_or( f64::NAN ) ),
            },
            Value::String( s ) => PropertyValue::String( s ),
            other => PropertyValue::Node( other ),
        }
    }
}


/// A single playback engine instance.
///
/// Every call blocks until the engine answers. Implementations report
/// failures through `Status` rather than panicking.
pub trait Engine {
    /// Brings the instance up after creation. Must succeed before commands.
    fn initialize( &mut self ) -> Status;

    /// Dispatches a command given as its name followed by string arguments.
    fn command( &mut self, args: &[&str] ) -> Status;

    /// Reads a named property.
    fn get_property( &mut self, name: &str ) -> Result<PropertyValue, Status>;

    /// Tears the instance down. Called once, when its owning context is dropped.
    fn terminate( &mut self );
}


/// Creates engine instances, one per playback context.
pub trait EngineFactory {
    type Engine: Engine;

    /// Instantiates a new, uninitialized engine.
    ///
    /// @param name - Name of the context the engine will back
    fn create( &mut self, name: &str ) -> Result<Self::Engine, Status>;
}


#[cfg( test )]
mod tests {
    use serde_json::json;

    use super::*;


    #[test]
    fn test_property_from_json() {
        assert_eq!( PropertyValue::from( json!( null ) ), PropertyValue::None );
        assert_eq!( PropertyValue::from( json!( true ) ), PropertyValue::Flag( true ) );
        assert_eq!( PropertyValue::from( json!( 4 ) ), PropertyValue::Int( 4 ) );
        assert_eq!( PropertyValue::from( json!( 1.25 ) ), PropertyValue::Double( 1.25 ) );
        assert_eq!( PropertyValue::from( json!( "a.mp3" ) ), PropertyValue::String( "a.mp3".into() ) );
        assert_eq!( PropertyValue::from( json!( [1, 2] ) ), PropertyValue::Node( json!( [1, 2] ) ) );
    }


    #[test]
    fn test_numeric_accessors() {
        assert_eq!( PropertyValue::Int( 3 ).as_f64(), Some( 3.0 ) );
        assert_eq!( PropertyValue::Double( 3.0 ).as_i64(), Some( 3 ) );
        assert_eq!( PropertyValue::Double( 3.5 ).as_i64(), None );
        assert_eq!( PropertyValue::String( "3".into() ).as_f64(), None );
    }
}
