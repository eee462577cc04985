mod codes;

pub use codes::{
    extract_order_codes,
    new_order_code,
    new_transaction_id,
    new_verification_token,
    numeric_suffix,
    render_transfer_memo,
    trailing_suffix,
    ORDER_CODE_SUFFIX_LEN,
};
