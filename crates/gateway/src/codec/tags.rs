//! Tag numbers and message types used by the venue dialect

/// Field tag
pub type Tag = u32;

// Standard header / trailer
pub const BEGIN_STRING: Tag = 8;
pub const BODY_LENGTH: Tag = 9;
pub const CHECKSUM: Tag = 10;
pub const MSG_SEQ_NUM: Tag = 34;
pub const MSG_TYPE: Tag = 35;
pub const SENDER_COMP_ID: Tag = 49;
pub const SENDING_TIME: Tag = 52;
pub const TARGET_COMP_ID: Tag = 56;

// Session level
pub const REF_SEQ_NUM: Tag = 45;
pub const TEXT: Tag = 58;
pub const ENCRYPT_METHOD: Tag = 98;
pub const HEARTBEAT_INTERVAL: Tag = 108;
pub const TEST_REQ_ID: Tag = 112;
pub const RESET_SEQ_NUM_FLAG: Tag = 141;
pub const SESSION_REJECT_REASON: Tag = 373;
pub const USERNAME: Tag = 553;
pub const PASSWORD: Tag = 554;
pub const PROTOCOL_SPEC: Tag = 10064;
pub const DEVICE_ID: Tag = 10150;

// Business reject
pub const REF_MSG_TYPE: Tag = 372;
pub const BUSINESS_REJECT_REF_ID: Tag = 379;
pub const BUSINESS_REJECT_REASON: Tag = 380;

// Instruments
pub const ACCOUNT: Tag = 1;
pub const COMMISSION: Tag = 12;
pub const COMM_TYPE: Tag = 13;
pub const CURRENCY: Tag = 15;
pub const SECURITY_ID_SOURCE: Tag = 22;
pub const SECURITY_ID: Tag = 48;
pub const SYMBOL: Tag = 55;
pub const SECURITY_DESC: Tag = 107;
pub const SETTL_CURRENCY: Tag = 120;
pub const CONTRACT_MULTIPLIER: Tag = 231;
pub const ENCODED_TEXT_LEN: Tag = 354;
pub const ENCODED_TEXT: Tag = 355;
pub const MIN_TRADE_VOL: Tag = 562;
pub const ROUND_LOT: Tag = 561;

// Security list
pub const SECURITY_REQ_ID: Tag = 320;
pub const SECURITY_RESPONSE_ID: Tag = 322;
pub const NO_RELATED_SYM: Tag = 146;
pub const SECURITY_LIST_REQUEST_TYPE: Tag = 559;
pub const SECURITY_REQUEST_RESULT: Tag = 560;
pub const TRADE_ENABLED: Tag = 10127;
pub const MAX_TRADE_VOLUME: Tag = 10058;
pub const TRADE_VOL_STEP: Tag = 10062;
pub const PRICE_PRECISION: Tag = 10057;
pub const MARGIN_FACTOR: Tag = 10137;
pub const SWAP_SIZE_SHORT: Tag = 10138;
pub const SWAP_SIZE_LONG: Tag = 10134;
pub const DEFAULT_SLIPPAGE: Tag = 10212;
pub const STATUS_GROUP_ID: Tag = 10125;
pub const SECURITY_GROUP: Tag = 10126;
pub const SWAP_ENABLED: Tag = 10155;
pub const TRIPLE_SWAP_DAY: Tag = 10170;

// Market history
pub const HISTORY_DATA_FROM: Tag = 10000;
/// Request end time; echoed as the end of the returned range
pub const HISTORY_DATA_TO: Tag = 10001;
pub const ALL_HISTORY_FROM: Tag = 10002;
pub const ALL_HISTORY_TO: Tag = 10003;
pub const NO_BARS: Tag = 10004;
pub const BAR_HIGH: Tag = 10005;
pub const BAR_LOW: Tag = 10006;
pub const BAR_OPEN: Tag = 10007;
pub const BAR_CLOSE: Tag = 10008;
pub const BAR_TIME: Tag = 10009;
pub const PRICE_TYPE: Tag = 10010;
pub const HISTORY_REQ_ID: Tag = 10011;
pub const BAR_PERIOD: Tag = 10012;
pub const HISTORY_DATA_TYPE: Tag = 10018;
pub const GRAPH_TYPE: Tag = 10020;
pub const HISTORY_REJECT_REASON: Tag = 10021;
pub const HISTORY_MAX_BARS: Tag = 10035;
pub const BAR_VOLUME: Tag = 10040;
pub const BAR_VOLUME_EX: Tag = 10041;

// Market data
pub const MD_REQ_ID: Tag = 262;
pub const SUBSCRIPTION_REQUEST_TYPE: Tag = 263;
pub const MARKET_DEPTH: Tag = 264;
pub const MD_UPDATE_TYPE: Tag = 265;
pub const NO_MD_ENTRY_TYPES: Tag = 267;
pub const NO_MD_ENTRIES: Tag = 268;
pub const MD_ENTRY_TYPE: Tag = 269;
pub const MD_ENTRY_PX: Tag = 270;
pub const MD_ENTRY_SIZE: Tag = 271;
pub const MD_UPDATE_ACTION: Tag = 279;
pub const MD_REQ_REJ_REASON: Tag = 281;
pub const ORIG_TIME: Tag = 42;
pub const TICK_ID: Tag = 10094;
pub const INDICATIVE_TICK: Tag = 10230;
pub const TOTAL_SNAPSHOTS: Tag = 10049;

// Orders
pub const AVG_PX: Tag = 6;
pub const CL_ORD_ID: Tag = 11;
pub const CUM_QTY: Tag = 14;
pub const EXEC_ID: Tag = 17;
pub const LAST_PX: Tag = 31;
pub const LAST_QTY: Tag = 32;
pub const ORDER_ID: Tag = 37;
pub const ORDER_QTY: Tag = 38;
pub const ORD_STATUS: Tag = 39;
pub const ORD_TYPE: Tag = 40;
pub const ORIG_CL_ORD_ID: Tag = 41;
pub const PRICE: Tag = 44;
pub const SIDE: Tag = 54;
pub const TIME_IN_FORCE: Tag = 59;
pub const TRANSACT_TIME: Tag = 60;
pub const STOP_PX: Tag = 99;
pub const CXL_REJ_REASON: Tag = 102;
pub const ORD_REJ_REASON: Tag = 103;
pub const EXPIRE_TIME: Tag = 126;
pub const EXEC_TYPE: Tag = 150;
pub const LEAVES_QTY: Tag = 151;
pub const CXL_REJ_RESPONSE_TO: Tag = 434;
pub const MASS_STATUS_REQ_ID: Tag = 584;
pub const MASS_STATUS_REQ_TYPE: Tag = 585;
pub const TOT_NUM_REPORTS: Tag = 911;
pub const LAST_RPT_REQUESTED: Tag = 912;
pub const NO_PARTY_IDS: Tag = 453;
pub const PARTY_ID: Tag = 448;
pub const PARTY_ID_SOURCE: Tag = 447;
pub const PARTY_ROLE: Tag = 452;

// Account info
pub const ACCOUNT_INFO_REQ_ID: Tag = 10100;
pub const ACCOUNT_NAME: Tag = 10101;
pub const ACCOUNTING_TYPE: Tag = 10102;
pub const BALANCE: Tag = 10103;
pub const EQUITY: Tag = 10104;
pub const MARGIN: Tag = 10105;
pub const LEVERAGE: Tag = 10106;
pub const ACCOUNT_VALID: Tag = 10107;
pub const ACCOUNT_BLOCKED: Tag = 10108;
pub const ACCOUNT_READONLY: Tag = 10109;
pub const MARGIN_CALL_LEVEL: Tag = 10110;
pub const STOP_OUT_LEVEL: Tag = 10111;

/// Message type values (tag 35)
pub mod msg_type {
    pub const HEARTBEAT: &str = "0";
    pub const TEST_REQUEST: &str = "1";
    pub const REJECT: &str = "3";
    pub const LOGOUT: &str = "5";
    pub const EXECUTION_REPORT: &str = "8";
    pub const ORDER_CANCEL_REJECT: &str = "9";
    pub const LOGON: &str = "A";
    pub const NEW_ORDER_SINGLE: &str = "D";
    pub const ORDER_CANCEL_REQUEST: &str = "F";
    pub const ORDER_CANCEL_REPLACE: &str = "G";
    pub const MARKET_DATA_REQUEST: &str = "V";
    pub const MARKET_DATA_SNAPSHOT: &str = "W";
    pub const MARKET_DATA_INCREMENTAL: &str = "X";
    pub const MARKET_DATA_REJECT: &str = "Y";
    pub const BUSINESS_REJECT: &str = "j";
    pub const SECURITY_LIST_REQUEST: &str = "x";
    pub const SECURITY_LIST: &str = "y";
    pub const ORDER_MASS_STATUS_REQUEST: &str = "AF";
    pub const MARKET_HISTORY_REQUEST: &str = "U1000";
    pub const MARKET_HISTORY_REJECT: &str = "U1001";
    pub const MARKET_HISTORY: &str = "U1002";
    pub const ACCOUNT_INFO_REQUEST: &str = "U1005";
    pub const ACCOUNT_INFO: &str = "U1006";
    pub const MARKET_DATA_ACK: &str = "U1011";

    /// Session-level (administrative) message types
    pub fn is_admin(msg_type: &str) -> bool {
        matches!(msg_type, HEARTBEAT | TEST_REQUEST | REJECT | LOGOUT | LOGON)
    }
}
