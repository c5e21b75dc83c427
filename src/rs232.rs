//! RS-232 flavor of the UART link.
//!
//! Plain asynchronous serial; initialization is the same for both
//! transfer directions. The aberrant rates are deliberately
//! off-standard values used to exercise peers that assume standard
//! baud rates.

use crate::hal::Usart;
use crate::types::BitrateHint;
use crate::uart::UartLink;

/// Line rates per bitrate hint.
pub const BITRATES: [u32; 4] = [
    9600,   // SlowRegular
    12345,  // SlowAberrant
    115200, // FastRegular
    123456, // FastAberrant
];

/// Brings the UART up for RS-232 at the hinted rate.
pub fn initialize<U: Usart>(link: &mut UartLink<U>, hint: BitrateHint) {
    link.hal.enable();
    link.hal.set_baudrate(BITRATES[hint.index()]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockUsart;

    #[test]
    fn test_hint_rate_mapping() {
        let cases = [
            (BitrateHint::SlowRegular, 9600),
            (BitrateHint::SlowAberrant, 12345),
            (BitrateHint::FastRegular, 115200),
            (BitrateHint::FastAberrant, 123456),
        ];

        for (hint, baud) in cases {
            let mut link = UartLink::new(MockUsart::new());
            initialize(&mut link, hint);
            assert!(link.hal.enabled);
            assert_eq!(link.hal.baud, baud);
        }
    }
}
