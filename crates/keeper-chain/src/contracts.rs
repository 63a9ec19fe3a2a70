//! Solidity bindings for the contracts the keeper talks to.

use alloy::sol;

sol! {
	/// Uniswap V1 exchange factory; enumerates tradable tokens by id.
	#[sol(rpc)]
	interface IUniswapFactory {
		function tokenCount() external view returns (uint256);
		function getTokenWithId(uint256 tokenId) external view returns (address);
	}

	/// UniswapEx limit-order book.
	#[sol(rpc)]
	interface IUniswapEx {
		event DepositETH(bytes32 indexed _key, address indexed _caller, uint256 _amount, bytes _data);

		function encodeOrder(address _fromToken, address _toToken, uint256 _minReturn, uint256 _fee, address _owner) external view returns (bytes memory);
		function depositETH(bytes calldata _data) external payable;
		function existOrder(address _fromToken, address _toToken, uint256 _minReturn, uint256 _fee, address _owner) external view returns (bool);
		function canExecuteOrder(address _fromToken, address _toToken, uint256 _minReturn, uint256 _fee, address _owner) external view returns (bool);
		function executeOrder(address _fromToken, address _toToken, uint256 _minReturn, uint256 _fee, address _owner) external returns (uint256 bought);
	}

	/// Subset of ERC-20 used to recognise order submissions.
	interface IERC20 {
		event Transfer(address indexed from, address indexed to, uint256 value);

		function transfer(address to, uint256 value) external returns (bool);
	}

	/// Leading part of every order encoding.
	struct OrderData {
		address sellAsset;
		address buyAsset;
		uint256 minReturn;
		uint256 fee;
		address owner;
	}
}

/// Byte length of a token transfer that carries an order: selector, the
/// `(vault, amount)` arguments and the ABI-wrapped order encoding.
pub const ORDER_TX_INPUT_LEN: usize = 356;

/// Offset of the ABI-wrapped order encoding inside an order transfer.
pub const ORDER_TX_SUFFIX_OFFSET: usize = 4 + 2 * 32;

/// Whether a transaction input is a token transfer with an order attached.
pub fn is_order_transaction(input: &[u8]) -> bool {
	use alloy::sol_types::SolCall;

	input.len() == ORDER_TX_INPUT_LEN && input.starts_with(&IERC20::transferCall::SELECTOR)
}
