//! Seek mode parsing.

use std::fmt;
use std::str::FromStr;

use crate::facade::FacadeError;


/// How the time argument of a seek is interpreted.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum SeekMode {
    /// Seconds from the current position
    Relative,
    /// Seconds from the start of the track
    Absolute,
    /// Percentage of the track, from the current position
    RelativePercent,
    /// Percentage of the track, from the start
    AbsolutePercent,
}


impl SeekMode {
    /// The argument the engine expects for this mode.
    pub fn as_str( self ) -> &'static str {
        match self {
            SeekMode::Relative => "relative",
            SeekMode::Absolute => "absolute",
            SeekMode::RelativePercent => "relative-percent",
            SeekMode::AbsolutePercent => "absolute-percent",
        }
    }
}


impl FromStr for SeekMode {
    type Err = FacadeError;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        match s {
            "relative" => Ok( SeekMode::Relative ),
            "absolute" => Ok( SeekMode::Absolute ),
            "relative-percent" => Ok( SeekMode::RelativePercent ),
            "absolute-percent" => Ok( SeekMode::AbsolutePercent ),
            _ => Err( FacadeError::InvalidArgument( format!(
                "Invalid seek mode: '{}'. Use 'relative', 'absolute', 'relative-percent', or 'absolute-percent'",
                s
            ))),
        }
    }
}


impl fmt::Display for SeekMode {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.write_str( self.as_str() )
    }
}


#[cfg( test )]
mod tests {
    use assert_matches::assert_matches;

    use super::*;


    #[test]
    fn test_parse_known_modes() {
        for mode in [
            SeekMode::Relative,
            SeekMode::Absolute,
            SeekMode::RelativePercent,
            SeekMode::AbsolutePercent,
        ] {
            assert_eq!( mode.as_str().parse::<SeekMode>().unwrap(), mode );
        }
    }


    #[test]
    fn test_parse_is_exact() {
        assert_matches!( "Relative".parse::<SeekMode>(), Err( FacadeError::InvalidArgument( _ ) ) );
        assert_matches!( "percent".parse::<SeekMode>(), Err( FacadeError::InvalidArgument( _ ) ) );
        assert_matches!( "".parse::<SeekMode>(), Err( FacadeError::InvalidArgument( _ ) ) );
    }
}
