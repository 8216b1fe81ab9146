//! Recording engine used by unit tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::{ Engine, EngineFactory, PropertyValue };
use crate::status::Status;


/// Everything the mock engines were asked to do, shared across instances.
#[derive( Debug, Default )]
pub struct EngineLog {
    /// Context name and joined command line, in call order
    pub commands: Vec<( String, String )>,
    pub created: Vec<String>,
    pub terminated: Vec<String>,
}


impl EngineLog {
    /// Commands issued against one context.
    pub fn commands_for( &self, name: &str ) -> Vec<String> {
        self.commands.iter()
            .filter( |( ctx, _ )| ctx == name )
            .map( |( _, cmd )| cmd.clone() )
            .collect()
    }


    pub fn count( &self, command: &str ) -> usize {
        self.commands.iter().filter( |( _, cmd )| cmd == command ).count()
    }
}


pub type SharedLog = Rc<RefCell<EngineLog>>;


pub struct MockEngine {
    name: String,
    log: SharedLog,
    initialize_status: Status,
    failures: HashMap<String, Status>,
    properties: HashMap<String, PropertyValue>,
}


impl Engine for MockEngine {
    fn initialize( &mut self ) -> Status {
        self.initialize_status
    }


    fn command( &mut self, args: &[&str] ) -> Status {
        let line = args.join( " " );
        self.log.borrow_mut().commands.push(( self.name.clone(), line.clone() ));
        self.failures.get( &line ).copied().unwrap_or( Status::SUCCESS )
    }


    fn get_property( &mut self, name: &str ) -> Result<PropertyValue, Status> {
        self.properties.get( name ).cloned().ok_or( Status::PROPERTY_UNAVAILABLE )
    }


    fn terminate( &mut self ) {
        self.log.borrow_mut().terminated.push( self.name.clone() );
    }
}


/// Factory handing out `MockEngine`s that all write into one log.
#[derive( Default )]
pub struct MockFactory {
    pub log: SharedLog,
    pub create_status: Option<Status>,
    pub initialize_status: Option<Status>,
    /// Joined command lines that should fail, with the status to report
    pub failures: HashMap<String, Status>,
    pub properties: HashMap<String, PropertyValue>,
}


impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }


    pub fn failing( mut self, command: &str, status: Status ) -> Self {
        self.failures.insert( command.to_string(), status );
        self
    }


    pub fn with_property( mut self, name: &str, value: PropertyValue ) -> Self {
        self.properties.insert( name.to_string(), value );
        self
    }
}


impl EngineFactory for MockFactory {
    type Engine = MockEngine;


    fn create( &mut self, name: &str ) -> Result<MockEngine, Status> {
        if let Some( status ) = self.create_status {
            return Err( status );
        }

        self.log.borrow_mut().created.push( name.to_string() );
        Ok( MockEngine {
            name: name.to_string(),
            log: Rc::clone( &self.log ),
            initialize_status: self.initialize_status.unwrap_or( Status::SUCCESS ),
            failures: self.failures.clone(),
            properties: self.properties.clone(),
        })
    }
}
